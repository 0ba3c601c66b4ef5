//! Field schemas for the colon-record decoder.
//!
//! A [`FieldSchema`] maps a record-type tag (the first `:`-delimited column
//! of a line, e.g. `pub`, `uid`, `fpr`) to a nesting depth and a 1-based
//! column-position → field-name table. The decoder applies the schema
//! positionally; columns with no mapped name are dropped.
//!
//! Two schemas ship built in: the GnuPG `--with-colons` key-listing
//! vocabulary ([`FieldSchema::key_listing`], the default) and the HKP
//! keyserver machine-readable index vocabulary ([`FieldSchema::hkp_index`]).
//! Callers may build or deserialize their own for other colon dialects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Record type starts a new tree in the decoded forest.
pub const DEPTH_ROOT: u8 = 1;
/// Record type attaches to the current root and re-anchors attachment there.
pub const DEPTH_CHILD: u8 = 2;
/// Record type attaches to the most recently opened node. Default for
/// record types absent from the schema.
pub const DEPTH_LEAF: u8 = 0;

/// Decoding rules for one record type: its nesting depth and the names of
/// its columns by 1-based position (position 1 is the type tag itself).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSpec {
    /// Nesting depth: 1 roots a tree, 2 attaches to the current root,
    /// 0 attaches to the most recently opened node.
    pub depth: u8,
    /// 1-based column position → field name. Unmapped positions are dropped.
    pub fields: BTreeMap<usize, String>,
}

impl RecordSpec {
    /// Build a spec from a depth and `(position, name)` pairs.
    pub fn new(depth: u8, fields: &[(usize, &str)]) -> Self {
        Self {
            depth,
            fields: fields
                .iter()
                .map(|(pos, name)| (*pos, (*name).to_owned()))
                .collect(),
        }
    }
}

/// A colon-record vocabulary: record-type tag → [`RecordSpec`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Per-record-type decoding rules.
    pub types: BTreeMap<String, RecordSpec>,
}

/// The 21 columns of a GnuPG `--with-colons` listing line, per the field
/// table in GnuPG's `doc/DETAILS`.
const COLONS_FIELD_MAP: [(usize, &str); 21] = [
    (1, "type"),
    (2, "validity"),
    (3, "key_length"),
    (4, "public_key_algo"),
    (5, "keyid"),
    (6, "creation_date"),
    (7, "expiry_date"),
    (8, "certsn_uidhash_siginfo"),
    (9, "owner_trust"),
    (10, "user_id"),
    (11, "sig_class"),
    (12, "key_cap"),
    (13, "issuercertfpr_otherinfo"),
    (14, "flags"),
    (15, "token_sn"),
    (16, "hash_algo"),
    (17, "curve_name"),
    (18, "compliance_flags"),
    (19, "last_update"),
    (20, "origin"),
    (21, "comment"),
];

impl FieldSchema {
    /// The GnuPG key-listing vocabulary: `tru`/`sec`/`pub` root a tree,
    /// `ssb`/`sub`/`fpr`/`uid` attach beneath it. All share the 21-column
    /// field map from `doc/DETAILS`.
    pub fn key_listing() -> Self {
        let mut types = BTreeMap::new();
        for tag in ["tru", "sec", "pub"] {
            types.insert(tag.to_owned(), RecordSpec::new(DEPTH_ROOT, &COLONS_FIELD_MAP));
        }
        for tag in ["ssb", "sub", "fpr", "uid"] {
            types.insert(tag.to_owned(), RecordSpec::new(DEPTH_CHILD, &COLONS_FIELD_MAP));
        }
        Self { types }
    }

    /// The HKP keyserver machine-readable index vocabulary (`op=vindex`
    /// with `options=mr`): `info` and `pub` lines root trees, `uid` lines
    /// attach to the preceding `pub`.
    pub fn hkp_index() -> Self {
        let mut types = BTreeMap::new();
        types.insert(
            "info".to_owned(),
            RecordSpec::new(
                DEPTH_ROOT,
                &[(1, "type"), (2, "version"), (3, "count")],
            ),
        );
        types.insert(
            "pub".to_owned(),
            RecordSpec::new(
                DEPTH_ROOT,
                &[
                    (1, "type"),
                    (2, "keyid"),
                    (3, "algo"),
                    (4, "keylen"),
                    (5, "creationdate"),
                    (6, "expirationdate"),
                    (7, "flags"),
                ],
            ),
        );
        types.insert(
            "uid".to_owned(),
            RecordSpec::new(
                DEPTH_CHILD,
                &[
                    (1, "type"),
                    (2, "user_id"),
                    (3, "creationdate"),
                    (4, "expirationdate"),
                    (5, "flags"),
                ],
            ),
        );
        Self { types }
    }

    /// Look up the spec for a record-type tag.
    pub fn spec_for(&self, record_type: &str) -> Option<&RecordSpec> {
        self.types.get(record_type)
    }

    /// Register or replace the spec for a record type.
    pub fn insert(&mut self, record_type: &str, spec: RecordSpec) {
        self.types.insert(record_type.to_owned(), spec);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_listing_depths() {
        let schema = FieldSchema::key_listing();
        assert_eq!(schema.spec_for("pub").expect("pub spec").depth, DEPTH_ROOT);
        assert_eq!(schema.spec_for("sec").expect("sec spec").depth, DEPTH_ROOT);
        assert_eq!(schema.spec_for("ssb").expect("ssb spec").depth, DEPTH_CHILD);
        assert_eq!(schema.spec_for("fpr").expect("fpr spec").depth, DEPTH_CHILD);
        assert_eq!(schema.spec_for("uid").expect("uid spec").depth, DEPTH_CHILD);
        assert!(schema.spec_for("grp").is_none());
    }

    #[test]
    fn test_key_listing_field_positions() {
        let schema = FieldSchema::key_listing();
        let spec = schema.spec_for("pub").expect("pub spec");
        assert_eq!(spec.fields.get(&1).map(String::as_str), Some("type"));
        assert_eq!(spec.fields.get(&5).map(String::as_str), Some("keyid"));
        assert_eq!(spec.fields.get(&10).map(String::as_str), Some("user_id"));
        assert_eq!(spec.fields.get(&21).map(String::as_str), Some("comment"));
        assert!(spec.fields.get(&22).is_none());
    }

    #[test]
    fn test_schema_json_round_trip() {
        let schema = FieldSchema::hkp_index();
        let json = serde_json::to_string(&schema).expect("serialize schema");
        let back: FieldSchema = serde_json::from_str(&json).expect("deserialize schema");
        assert_eq!(back, schema);
    }
}
