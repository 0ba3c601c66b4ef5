//! Logging setup for the command-line binary using `tracing-subscriber`.
//!
//! The library itself only emits `tracing` events (notably the trust-policy
//! opt-out warnings); installing a subscriber is the caller's business.
//! The bundled CLI uses [`init_cli`].

use tracing_subscriber::EnvFilter;

/// Initialise human-readable logging on stderr.
///
/// Controlled by `RUST_LOG` (default: `info`). Stdout stays reserved for
/// the decoded JSON output.
pub fn init_cli() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
