//! Colon-record decoder for GnuPG `--with-colons` output.
//!
//! Listing output is line-delimited; each line is a record whose columns are
//! separated by `:` and whose first column names the record type. Records at
//! different nesting depths are folded into trees: a depth-1 record (`pub`,
//! `sec`, `tru`) starts a new tree, a depth-2 record (`sub`, `ssb`, `fpr`,
//! `uid`) attaches beneath the current root, and a depth-0 record attaches
//! to whatever node was opened most recently. A second child of the same
//! type under one parent promotes that child entry from a single node to an
//! ordered list.
//!
//! [`decode_flat_lines`] is the degenerate single-level mode used for
//! `--card-status` dumps, where lines carry no nesting at all.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

use crate::schema::{FieldSchema, RecordSpec, DEPTH_CHILD, DEPTH_LEAF, DEPTH_ROOT};

/// Structural failure while folding records into a forest.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// A depth-0 or depth-2 record appeared before any depth-1 record
    /// opened a tree to attach it to.
    #[error("record '{record_type}' at depth {depth} has no open parent")]
    OrphanRecord {
        /// Type tag of the offending record.
        record_type: String,
        /// Declared depth of the offending record.
        depth: u8,
    },
    /// The schema declares a depth outside {0, 1, 2} for this record type.
    #[error("record type '{record_type}' declares unsupported depth {depth}")]
    InvalidDepth {
        /// Type tag of the offending record.
        record_type: String,
        /// The unsupported depth value.
        depth: u8,
    },
}

/// One decoded colon record, optionally carrying child records grouped by
/// their type tag.
///
/// Scalar fields come from applying the schema's column table to the line;
/// columns that were empty in the source are absent here, never stored as
/// empty strings. Serializes as a single flat JSON object: scalar fields
/// plus one key per child type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordNode {
    fields: BTreeMap<String, String>,
    children: BTreeMap<String, ChildSlot>,
}

/// Child records of one type under a parent: a single node until a second
/// record of the same type arrives, an ordered list from then on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildSlot {
    /// Exactly one child of this type has been seen.
    One(RecordNode),
    /// Two or more children of this type, in input order.
    Many(Vec<RecordNode>),
}

impl ChildSlot {
    fn push(&mut self, node: RecordNode) {
        match self {
            ChildSlot::One(first) => {
                *self = ChildSlot::Many(vec![std::mem::take(first), node]);
            }
            ChildSlot::Many(list) => list.push(node),
        }
    }

    /// The first child in this slot.
    pub fn first(&self) -> Option<&RecordNode> {
        match self {
            ChildSlot::One(node) => Some(node),
            ChildSlot::Many(list) => list.first(),
        }
    }

    /// Iterate the children in input order.
    pub fn iter(&self) -> impl Iterator<Item = &RecordNode> {
        match self {
            ChildSlot::One(node) => std::slice::from_ref(node).iter(),
            ChildSlot::Many(list) => list.as_slice().iter(),
        }
    }
}

impl Serialize for ChildSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ChildSlot::One(node) => node.serialize(serializer),
            ChildSlot::Many(list) => {
                let mut seq = serializer.serialize_seq(Some(list.len()))?;
                for node in list {
                    seq.serialize_element(node)?;
                }
                seq.end()
            }
        }
    }
}

impl RecordNode {
    /// The record-type tag (`pub`, `uid`, ...). Empty only for a node
    /// constructed via `Default`, which the decoder never emits.
    pub fn record_type(&self) -> &str {
        self.field("type").unwrap_or("")
    }

    /// A scalar field by name, if the source column was present and non-empty.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// The first child record of the given type, if any.
    pub fn child(&self, record_type: &str) -> Option<&RecordNode> {
        self.children.get(record_type).and_then(ChildSlot::first)
    }

    /// All child records of the given type, in input order.
    pub fn children_of(&self, record_type: &str) -> Vec<&RecordNode> {
        self.children
            .get(record_type)
            .map(|slot| slot.iter().collect())
            .unwrap_or_default()
    }

    /// The child slot for a type, exposing the single/list distinction.
    pub fn child_slot(&self, record_type: &str) -> Option<&ChildSlot> {
        self.children.get(record_type)
    }

    fn attach(&mut self, node: RecordNode) {
        let tag = node.record_type().to_owned();
        match self.children.entry(tag) {
            Entry::Vacant(slot) => {
                slot.insert(ChildSlot::One(node));
            }
            Entry::Occupied(mut slot) => slot.get_mut().push(node),
        }
    }
}

impl Serialize for RecordNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.fields.len().saturating_add(self.children.len());
        let mut map = serializer.serialize_map(Some(len))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        for (tag, slot) in &self.children {
            map.serialize_entry(tag, slot)?;
        }
        map.end()
    }
}

/// An ordered sequence of decoded record trees, one per depth-1 record in
/// the input.
pub type RecordForest = Vec<RecordNode>;

/// Decode a `--with-colons` blob with the default key-listing schema.
///
/// # Errors
///
/// Returns [`DecodeError`] when record nesting is malformed; see
/// [`decode_colons_with`].
pub fn decode_colons(text: &str) -> Result<RecordForest, DecodeError> {
    decode_colons_with(text, &FieldSchema::key_listing())
}

/// Decode a colon-record blob into a forest using the supplied schema.
///
/// Lines split on `:`; the first column is the record-type tag and selects
/// the schema entry. Columns with no mapped field name and empty columns
/// are dropped. A `uid` record's `user_id` is additionally split as an RFC
/// 5322 mailbox into `name`/`email`/`domain`/`username` fields; if it does
/// not parse as one, the record decodes without them. Record types absent
/// from the schema fold at depth 0.
///
/// # Errors
///
/// [`DecodeError::OrphanRecord`] when a depth-0/2 record appears before any
/// depth-1 record, [`DecodeError::InvalidDepth`] when the schema maps a
/// record type to a depth outside {0, 1, 2}.
pub fn decode_colons_with(text: &str, schema: &FieldSchema) -> Result<RecordForest, DecodeError> {
    let mut forest: RecordForest = Vec::new();
    // The currently open tree: its root, plus the open depth-2 child that
    // depth-0 records attach to once one exists.
    let mut open: Option<OpenTree> = None;

    for line in text.lines() {
        let Some((depth, node)) = decode_line(line, schema) else {
            continue;
        };

        match depth {
            DEPTH_ROOT => {
                if let Some(tree) = open.take() {
                    forest.push(tree.close());
                }
                open = Some(OpenTree::new(node));
            }
            DEPTH_CHILD => match open.as_mut() {
                Some(tree) => tree.open_child(node),
                None => {
                    return Err(DecodeError::OrphanRecord {
                        record_type: node.record_type().to_owned(),
                        depth,
                    })
                }
            },
            DEPTH_LEAF => match open.as_mut() {
                Some(tree) => tree.attach_leaf(node),
                None => {
                    return Err(DecodeError::OrphanRecord {
                        record_type: node.record_type().to_owned(),
                        depth,
                    })
                }
            },
            other => {
                return Err(DecodeError::InvalidDepth {
                    record_type: node.record_type().to_owned(),
                    depth: other,
                })
            }
        }
    }

    if let Some(tree) = open.take() {
        forest.push(tree.close());
    }

    Ok(forest)
}

/// Decode single-level colon output (e.g. `--card-status`) into a map from
/// the first column to the remaining columns. A repeated key keeps the last
/// line's columns; blank lines are skipped.
pub fn decode_flat_lines(text: &str) -> BTreeMap<String, Vec<String>> {
    let mut map = BTreeMap::new();
    for line in text.lines() {
        let mut columns = line.split(':');
        let Some(key) = columns.next() else { continue };
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_owned(), columns.map(str::to_owned).collect());
    }
    map
}

// ── Forest queries ──────────────────────────────────────────────

/// Find the tree whose `child_type` child (typically `ssb` or `sub`) has a
/// `keyid` that is a case-insensitive suffix of `sub_key_id`.
///
/// GnuPG listings carry the 16-hex-digit key id while card status and
/// VALIDSIG events carry the full fingerprint, so lookups match the key id
/// against the tail of the queried identifier. Returns the first match.
pub fn find_by_subkey_id<'a>(
    forest: &'a [RecordNode],
    sub_key_id: &str,
    child_type: &str,
) -> Option<&'a RecordNode> {
    let wanted = sub_key_id.to_lowercase();
    forest.iter().find(|tree| {
        tree.children_of(child_type).iter().any(|subkey| {
            subkey
                .field("keyid")
                .is_some_and(|keyid| wanted.ends_with(&keyid.to_lowercase()))
        })
    })
}

/// Find every tree where the dotted `path` resolves to `value`.
///
/// Path segments walk child types first (`uid.email` reads the `email`
/// field of the first `uid` child); the final segment names a scalar field.
pub fn find_by_field<'a>(forest: &'a [RecordNode], path: &str, value: &str) -> Vec<&'a RecordNode> {
    forest
        .iter()
        .filter(|tree| reach(tree, path) == Some(value))
        .collect()
}

/// Key ids of every `child_type` subkey of `node` whose capability column
/// equals `cap` (e.g. `e` for encryption, `s` for signing).
pub fn subkey_ids_with_capability<'a>(
    node: &'a RecordNode,
    cap: &str,
    child_type: &str,
) -> Vec<&'a str> {
    node.children_of(child_type)
        .iter()
        .filter(|subkey| subkey.field("key_cap") == Some(cap))
        .filter_map(|subkey| subkey.field("keyid"))
        .collect()
}

/// Resolve a dotted path against a node: intermediate segments select the
/// first child of that type, the final segment reads a scalar field.
fn reach<'a>(node: &'a RecordNode, path: &str) -> Option<&'a str> {
    let mut current = node;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            return current.field(segment);
        }
        current = current.child(segment)?;
    }
    None
}

// ── Line decoding ───────────────────────────────────────────────

struct OpenTree {
    root: RecordNode,
    child: Option<RecordNode>,
}

impl OpenTree {
    fn new(root: RecordNode) -> Self {
        Self { root, child: None }
    }

    /// Attach the previously open depth-2 child to the root and make `node`
    /// the new attachment point.
    fn open_child(&mut self, node: RecordNode) {
        if let Some(prev) = self.child.take() {
            self.root.attach(prev);
        }
        self.child = Some(node);
    }

    /// Attach a depth-0 record to the most recently opened node.
    fn attach_leaf(&mut self, node: RecordNode) {
        match self.child.as_mut() {
            Some(child) => child.attach(node),
            None => self.root.attach(node),
        }
    }

    fn close(mut self) -> RecordNode {
        if let Some(child) = self.child.take() {
            self.root.attach(child);
        }
        self.root
    }
}

/// Decode one line into its declared depth and record. Returns `None` for
/// blank lines (no record type).
fn decode_line(line: &str, schema: &FieldSchema) -> Option<(u8, RecordNode)> {
    let columns: Vec<&str> = line.split(':').collect();
    let tag = *columns.first()?;
    if tag.is_empty() {
        return None;
    }

    let spec = schema.spec_for(tag);
    let depth = spec.map_or(DEPTH_LEAF, |s| s.depth);

    let mut node = RecordNode::default();
    if let Some(spec) = spec {
        apply_spec(&mut node, spec, &columns);
    }
    // Every record carries its type tag, whether or not the schema maps
    // column 1. Unknown record types keep only the tag.
    if node.field("type").is_none() {
        node.fields.insert("type".to_owned(), tag.to_owned());
    }

    if node.record_type() == "uid" {
        augment_mailbox(&mut node);
    }

    Some((depth, node))
}

fn apply_spec(node: &mut RecordNode, spec: &RecordSpec, columns: &[&str]) {
    for (position, value) in (1_usize..).zip(columns.iter()) {
        if value.is_empty() {
            continue;
        }
        if let Some(name) = spec.fields.get(&position) {
            node.fields.insert(name.clone(), (*value).to_owned());
        }
    }
}

/// Split a `uid` record's `user_id` as an RFC 5322 mailbox and attach the
/// parts as `name`, `email`, `domain` and `username` fields. A user id that
/// is not a parseable mailbox leaves the record untouched.
fn augment_mailbox(node: &mut RecordNode) {
    let Some(user_id) = node.field("user_id") else {
        return;
    };

    let parsed = match mailparse::addrparse(user_id) {
        Ok(list) => list,
        Err(err) => {
            debug!(user_id, error = %err, "uid is not an RFC 5322 mailbox, skipping split");
            return;
        }
    };
    let Some(mailparse::MailAddr::Single(single)) = parsed.first() else {
        debug!(user_id, "uid is not a single mailbox, skipping split");
        return;
    };

    if let Some(name) = &single.display_name {
        if !name.is_empty() {
            node.fields.insert("name".to_owned(), name.clone());
        }
    }
    node.fields.insert("email".to_owned(), single.addr.clone());
    if let Some((local, domain)) = single.addr.rsplit_once('@') {
        node.fields.insert("username".to_owned(), local.to_owned());
        node.fields.insert("domain".to_owned(), domain.to_owned());
    }
}
