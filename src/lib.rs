//! gpg-aux — decoder and trust-policy evaluator for GnuPG's auxiliary
//! output channels.
//!
//! GnuPG emits two machine-readable text protocols alongside its payload
//! output: the colon-delimited record stream (`--with-colons` listings) and
//! the status-event stream (`--status-fd` lines prefixed `[GNUPG:]`). This
//! crate decodes both into structured values and evaluates a caller-supplied
//! trust policy over a decoded status sequence to accept or reject a
//! verified signature.
//!
//! The crate performs no cryptography and spawns no processes: callers
//! capture the output buffers of a finished `gpg` invocation and hand the
//! text here. Every decode is a pure function over its input.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod colons;
pub mod logging;
pub mod schema;
pub mod status;
pub mod trust;

pub use colons::{
    decode_colons, decode_colons_with, decode_flat_lines, DecodeError, RecordForest, RecordNode,
};
pub use schema::{FieldSchema, RecordSpec};
pub use status::{decode_status, StatusEvent, StatusEventSequence};
pub use trust::{ExceptionPolicy, PolicyError, SignatureResult, TrustLevelPolicy, TrustResult};
