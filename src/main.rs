//! gpg-aux CLI — decode captured GnuPG auxiliary output to JSON.
//!
//! Reads one captured buffer from stdin and prints the decoded structure as
//! pretty JSON on stdout, so `--with-colons` listings, `--card-status`
//! dumps and `--status-fd` transcripts can be inspected without writing
//! code:
//!
//! ```text
//! gpg --list-keys --with-colons | gpg-aux colons
//! gpg --card-status --with-colons | gpg-aux card
//! gpg --status-fd 2 --decrypt msg.asc 2>&1 >/dev/null | gpg-aux status
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use gpg_aux::{colons, logging, schema::FieldSchema, status};

#[derive(Parser)]
#[command(name = "gpg-aux", version, about = "Decode GnuPG auxiliary output to JSON")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a `--with-colons` listing into a record forest.
    Colons {
        /// JSON file with an alternate field schema (default: the GnuPG
        /// key-listing vocabulary).
        #[arg(long)]
        schema: Option<PathBuf>,
    },
    /// Decode single-level colon output such as a `--card-status` dump.
    Card,
    /// Decode a `--status-fd` transcript into its event sequence.
    Status,
}

fn main() -> Result<()> {
    logging::init_cli();
    let cli = Cli::parse();

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;

    let json = match cli.command {
        Command::Colons { schema } => {
            let schema = match schema {
                Some(path) => load_schema(&path)?,
                None => FieldSchema::key_listing(),
            };
            let forest = colons::decode_colons_with(&input, &schema)
                .context("failed to decode colon records")?;
            serde_json::to_string_pretty(&forest)?
        }
        Command::Card => {
            let map = colons::decode_flat_lines(&input);
            serde_json::to_string_pretty(&map)?
        }
        Command::Status => {
            let events = status::decode_status(&input);
            serde_json::to_string_pretty(&events)?
        }
    };

    println!("{json}");
    Ok(())
}

fn load_schema(path: &Path) -> Result<FieldSchema> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse schema file {}", path.display()))
}
