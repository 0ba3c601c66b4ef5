//! Status-event decoder for GnuPG `--status-fd` output.
//!
//! During encrypt/decrypt/sign/import operations GnuPG reports
//! machine-readable progress on a dedicated descriptor: one event per line,
//! prefixed with the `[GNUPG:]` sentinel, then a keyword and positional
//! arguments. This module filters the status lines out of a captured buffer
//! and decodes each into a [`StatusEvent`] using a fixed per-keyword
//! argument table taken from GnuPG's `doc/DETAILS` status protocol.
//!
//! Unknown keywords are never an error: they decode to a pass-through event
//! carrying the raw argument list so new protocol keywords degrade safely.
//! Events are independent; no cross-event state exists at decode time. The
//! trust-policy layer ([`crate::trust`]) is what scans the sequence as a
//! whole.

use std::collections::BTreeMap;

use serde::Serialize;

/// Sentinel prefix marking a status line; everything else in the buffer
/// belongs to another channel and is ignored here.
pub const STATUS_SENTINEL: &str = "[GNUPG:]";

/// One decoded field value: most fields are single tokens, a few capture
/// the remainder of the argument list (warning text, error modes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A single argument, or several joined back into free text.
    Text(String),
    /// The remaining arguments as an ordered list.
    List(Vec<String>),
}

/// Payload of a status event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StatusPayload {
    /// A recognized keyword's arguments mapped through its schema. Empty
    /// for keywords that carry no payload (phase markers).
    Fields(BTreeMap<String, FieldValue>),
    /// An unrecognized keyword's raw argument list, untouched.
    Raw(Vec<String>),
}

/// One decoded status line: the keyword plus its decoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    /// The status keyword (`GOODSIG`, `VALIDSIG`, ...).
    pub keyword: String,
    /// Decoded arguments, or the raw list for unknown keywords.
    pub payload: StatusPayload,
}

impl StatusEvent {
    /// A decoded text field by name. `None` for list fields, raw payloads,
    /// and fields absent from the line.
    pub fn field(&self, name: &str) -> Option<&str> {
        match &self.payload {
            StatusPayload::Fields(fields) => match fields.get(name)? {
                FieldValue::Text(value) => Some(value),
                FieldValue::List(_) => None,
            },
            StatusPayload::Raw(_) => None,
        }
    }

    /// A decoded list field by name.
    pub fn field_list(&self, name: &str) -> Option<&[String]> {
        match &self.payload {
            StatusPayload::Fields(fields) => match fields.get(name)? {
                FieldValue::List(values) => Some(values),
                FieldValue::Text(_) => None,
            },
            StatusPayload::Raw(_) => None,
        }
    }
}

/// All status events decoded from one buffer, in emission order.
///
/// Order matters to consumers: later events reference identifiers that
/// earlier events introduced, and the policy queries in [`crate::trust`]
/// scan the whole sequence rather than trusting any single line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StatusEventSequence {
    events: Vec<StatusEvent>,
}

impl StatusEventSequence {
    /// The decoded events in emission order.
    pub fn events(&self) -> &[StatusEvent] {
        &self.events
    }

    /// Iterate the events in emission order.
    pub fn iter(&self) -> std::slice::Iter<'_, StatusEvent> {
        self.events.iter()
    }

    /// Number of decoded status lines.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when the buffer contained no status lines.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<'a> IntoIterator for &'a StatusEventSequence {
    type Item = &'a StatusEvent;
    type IntoIter = std::slice::Iter<'a, StatusEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Decode a captured output buffer into its status-event sequence.
///
/// Only lines starting with [`STATUS_SENTINEL`] are decoded; interleaved
/// payload or logging lines are skipped. Never fails: unknown keywords
/// pass through raw and missing positional arguments simply omit their
/// field.
pub fn decode_status(text: &str) -> StatusEventSequence {
    let mut events = Vec::new();
    for line in text.lines() {
        let Some(rest) = line.strip_prefix(STATUS_SENTINEL) else {
            continue;
        };
        let mut tokens = rest.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };
        let args: Vec<&str> = tokens.collect();
        events.push(decode_event(keyword, &args));
    }
    StatusEventSequence { events }
}

// ── Per-keyword argument schemas ────────────────────────────────

/// Where one field's value comes from in the positional argument list.
#[derive(Debug, Clone, Copy)]
enum ArgSpec {
    /// The argument at this 0-based index.
    Index(usize),
    /// All arguments from this index on, as a list.
    Rest(usize),
    /// All arguments from this index on, joined back into free text
    /// (usernames and warning text contain spaces).
    RestJoined(usize),
}

type FieldTable = &'static [(&'static str, ArgSpec)];

enum Transform {
    Table(FieldTable),
    Custom(fn(&[&str]) -> BTreeMap<String, FieldValue>),
}

use ArgSpec::{Index, Rest, RestJoined};

/// Signature verdicts all share one shape: a key id or fingerprint, then
/// the signer's user id as free text.
const SIG_FIELDS: FieldTable = &[
    ("keyid_or_fingerprint", Index(0)),
    ("username", RestJoined(1)),
];

/// Cipher parameters reported at en/decryption boundaries.
const CRYPTO_INFO: FieldTable = &[
    ("mdc_method", Index(0)),
    ("sym_algo", Index(1)),
    ("aead_algo", Index(2)),
];

/// Web-of-trust verdicts carrying an error code and validation model.
const TRUST_VERDICT: FieldTable = &[("code", Index(0)), ("validation_model", Index(1))];

/// No payload beyond the keyword itself.
const EMPTY: FieldTable = &[];

fn keyword_transform(keyword: &str) -> Option<Transform> {
    let table: FieldTable = match keyword {
        // Signature lifecycle.
        "NEWSIG" => &[("signers_uid", Rest(0))],
        "GOODSIG" | "EXPSIG" | "EXPKEYSIG" | "REVKEYSIG" | "BADSIG" => SIG_FIELDS,
        "ERRSIG" => &[
            ("keyid", Index(0)),
            ("pubkey_algo", Index(1)),
            ("hash_algo", Index(2)),
            ("sig_class", Index(3)),
            ("time", Index(4)),
            ("return_code", Index(5)),
            ("fingerprint", Index(6)),
        ],
        "VALIDSIG" => &[
            ("fingerprint", Index(0)),
            ("creation_date", Index(1)),
            ("timestamp", Index(2)),
            ("expire_timestamp", Index(3)),
            ("version", Index(4)),
            ("reserved", Index(5)),
            ("pubkey_algo", Index(6)),
            ("hash_algo", Index(7)),
            ("sig_class", Index(8)),
            ("primary_key_fingerprint", Index(9)),
        ],
        "SIG_ID" => &[
            ("radix", Index(0)),
            ("sig_creation_date", Index(1)),
            ("sig_timestamp", Index(2)),
        ],

        // Decryption lifecycle.
        "ENC_TO" => &[
            ("keyid", Index(0)),
            ("keytype", Index(1)),
            ("keylength", Index(2)),
        ],
        "BEGIN_DECRYPTION" | "END_DECRYPTION" | "DECRYPTION_FAILED" | "DECRYPTION_OKAY" => EMPTY,
        "DECRYPTION_KEY" => &[
            ("fingerprint", Index(0)),
            ("primary_key_fingerprint", Index(1)),
            ("owner_trust", Index(2)),
        ],
        "DECRYPTION_INFO" => CRYPTO_INFO,
        "SESSION_KEY" => return Some(Transform::Custom(decode_session_key)),

        // Encryption and signing lifecycle.
        "BEGIN_ENCRYPTION" => CRYPTO_INFO,
        "END_ENCRYPTION" | "BEGIN_SIGNING" => EMPTY,
        "ALREADY_SIGNED" => &[("keyid", Index(0))],
        "SIG_CREATED" => &[
            ("type", Index(0)),
            ("pubkey_algo", Index(1)),
            ("hash_algo", Index(2)),
            ("sig_class", Index(3)),
            ("timestamp", Index(4)),
            ("fingerprint", Index(5)),
        ],
        "PLAINTEXT" => &[
            ("format", Index(0)),
            ("timestamp", Index(1)),
            ("filename", Index(2)),
        ],
        "PLAINTEXT_LENGTH" => &[("length", Index(0))],
        "ENCRYPTION_COMPLIANCE_MODE"
        | "DECRYPTION_COMPLIANCE_MODE"
        | "VERIFICATION_COMPLIANCE_MODE" => &[("flags", Rest(0))],

        // Key consideration, creation, expiry.
        "KEY_CONSIDERED" => &[("fingerprint", Index(0)), ("flags", Index(1))],
        "KEYEXPIRED" => &[("timestamp", Index(0))],
        "KEYREVOKED" | "NO_PUBKEY" => EMPTY,
        "NO_SECKEY" => &[("keyid", Index(0))],
        "KEY_CREATED" => &[
            ("type", Index(0)),
            ("fingerprint", Index(1)),
            ("handle", Index(2)),
        ],
        "KEY_NOT_CREATED" => &[("handle", Index(0))],

        // Trust verdicts.
        "TRUST_UNDEFINED" | "TRUST_NEVER" => &[("error", Rest(0))],
        "TRUST_MARGINAL" | "TRUST_FULLY" | "TRUST_ULTIMATE" => TRUST_VERDICT,

        // Generic outcome markers.
        "GOODMDC" | "SC_OP_SUCCESS" => EMPTY,
        "FAILURE" => &[("location", Index(0)), ("code", Index(1))],
        "SUCCESS" => &[("location", Index(0))],
        "WARNING" => &[
            ("location", Index(0)),
            ("code", Index(1)),
            ("text", RestJoined(2)),
        ],
        "ERROR" => &[("location", Index(0)), ("code", Index(1)), ("mode", Rest(2))],

        // Smart-card control.
        "CARDCTRL" => &[("what", Index(0)), ("serialno", Index(1))],
        "SC_OP_FAILURE" => &[("code", Index(0))],

        // Invalid recipients / signers.
        "INV_RECP" => &[("reason", Index(0)), ("recipient", Index(1))],
        "INV_SGNR" => &[("reason", Index(0)), ("sender", Index(1))],

        // Import and export summaries.
        "IMPORTED" => SIG_FIELDS,
        "IMPORT_OK" | "IMPORT_PROBLEM" => &[("reason", Index(0)), ("fingerprint", Index(1))],
        "IMPORT_RES" => &[
            ("count", Index(0)),
            ("no_user_id", Index(1)),
            ("imported", Index(2)),
            ("reserved", Index(3)),
            ("unchanged", Index(4)),
            ("n_uids", Index(5)),
            ("n_subkeys", Index(6)),
            ("n_sigs", Index(7)),
            ("n_revocations", Index(8)),
            ("secret_read", Index(9)),
            ("secret_imported", Index(10)),
            ("secret_unchanged", Index(11)),
            ("skipped_new", Index(12)),
            ("not_imported", Index(13)),
            ("skipped_v3", Index(14)),
        ],
        "EXPORTED" => &[("fingerprint", Index(0))],
        "EXPORT_RES" => &[
            ("count", Index(0)),
            ("secret_count", Index(1)),
            ("exported", Index(2)),
        ],

        _ => return None,
    };
    Some(Transform::Table(table))
}

fn decode_event(keyword: &str, args: &[&str]) -> StatusEvent {
    let payload = match keyword_transform(keyword) {
        Some(Transform::Table(table)) => StatusPayload::Fields(apply_table(table, args)),
        Some(Transform::Custom(decode)) => StatusPayload::Fields(decode(args)),
        None => StatusPayload::Raw(args.iter().map(|a| (*a).to_owned()).collect()),
    };
    StatusEvent {
        keyword: keyword.to_owned(),
        payload,
    }
}

fn apply_table(table: FieldTable, args: &[&str]) -> BTreeMap<String, FieldValue> {
    let mut fields = BTreeMap::new();
    for (name, spec) in table {
        let value = match spec {
            Index(idx) => args.get(*idx).map(|arg| FieldValue::Text((*arg).to_owned())),
            Rest(from) => args.get(*from..).filter(|rest| !rest.is_empty()).map(|rest| {
                FieldValue::List(rest.iter().map(|a| (*a).to_owned()).collect())
            }),
            RestJoined(from) => args
                .get(*from..)
                .filter(|rest| !rest.is_empty())
                .map(|rest| FieldValue::Text(rest.join(" "))),
        };
        if let Some(value) = value {
            fields.insert((*name).to_owned(), value);
        }
    }
    fields
}

/// SESSION_KEY carries a single `<algo>:<hexdigits>` composite argument
/// that splits into two fields.
fn decode_session_key(args: &[&str]) -> BTreeMap<String, FieldValue> {
    let mut fields = BTreeMap::new();
    let Some(arg) = args.first() else {
        return fields;
    };
    match arg.split_once(':') {
        Some((algo, hex_digits)) => {
            if !algo.is_empty() {
                fields.insert("algo".to_owned(), FieldValue::Text(algo.to_owned()));
            }
            if !hex_digits.is_empty() {
                fields.insert(
                    "hex_digits".to_owned(),
                    FieldValue::Text(hex_digits.to_owned()),
                );
            }
        }
        None => {
            fields.insert("algo".to_owned(), FieldValue::Text((*arg).to_owned()));
        }
    }
    fields
}
