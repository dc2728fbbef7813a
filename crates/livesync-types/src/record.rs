//! The replicated file record and its wire shape.
//!
//! On the store a record is a flat JSON object keyed by its [`FileId`]:
//!
//! ```json
//! { "name": "a.txt", "content": "hi", "lastModified": 1700000000000, "size": 2, "type": "TXT" }
//! ```
//!
//! The id is the store key, never a field. A null node is a tombstone.
//! Payloads arrive shape-free from untrusted peers, so [`Record::from_node`]
//! is the single place that decides what counts as a file.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ids::FileId;

/// File type reported when a name has no usable extension.
pub const DEFAULT_FILE_TYPE: &str = "TXT";

/// Latest representable `lastModified`: 9999-12-31T23:59:59.999Z.
pub const MAX_TIMESTAMP_MS: u64 = 253_402_300_799_999;

/// Wire field names of a file node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::AsRefStr, strum::Display)]
#[strum(serialize_all = "camelCase")]
pub enum Field {
    Name,
    Content,
    LastModified,
    Size,
    Type,
}

/// Rejections raised before any store interaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// An identifier was empty after trimming.
    #[error("{0} must not be empty")]
    EmptyId(&'static str),

    /// A required field was absent.
    #[error("missing field `{0}`")]
    MissingField(Field),

    /// A field had the wrong JSON type.
    #[error("field `{field}` must be {expected}")]
    WrongType { field: Field, expected: &'static str },

    /// A file name was empty.
    #[error("file name must not be empty")]
    EmptyName,

    /// A timestamp past year 9999.
    #[error("field `{0}` is out of range")]
    OutOfRange(Field),
}

/// UTF-8 byte length of `content`.
pub fn byte_size(content: &str) -> u64 {
    content.len() as u64
}

/// Uppercased extension of `name`, or `TXT` when there is none.
///
/// ```
/// use livesync_types::file_type_for;
/// assert_eq!(file_type_for("notes.md"), "MD");
/// assert_eq!(file_type_for("archive.tar.gz"), "GZ");
/// assert_eq!(file_type_for("README"), "TXT");
/// ```
pub fn file_type_for(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_uppercase(),
        _ => DEFAULT_FILE_TYPE.to_string(),
    }
}

/// A text file shared in a room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: FileId,
    pub name: String,
    pub content: String,
    /// Epoch milliseconds of the last write.
    pub last_modified: u64,
    /// UTF-8 byte length of `content`.
    pub size: u64,
    #[serde(rename = "type")]
    pub file_type: String,
}

impl FileRecord {
    /// Build a record with derived fields, stamped now.
    pub fn new(id: FileId, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_timestamp(id, name, content, crate::now_millis())
    }

    /// Build a record with derived fields and an explicit timestamp.
    pub fn with_timestamp(
        id: FileId,
        name: impl Into<String>,
        content: impl Into<String>,
        last_modified: u64,
    ) -> Self {
        let name = name.into();
        let content = content.into();
        Self {
            size: byte_size(&content),
            file_type: file_type_for(&name),
            id,
            name,
            content,
            last_modified,
        }
    }

    /// True when `other` carries the same revision (content and timestamp).
    ///
    /// This is the no-op test for redelivered or self-echoed events.
    pub fn same_revision(&self, other: &FileRecord) -> bool {
        self.content == other.content && self.last_modified == other.last_modified
    }

    /// Apply a content patch, keeping id, name and type.
    pub fn patched(&self, patch: &ContentPatch) -> Self {
        Self {
            content: patch.content.clone(),
            last_modified: patch.last_modified,
            size: patch.size,
            ..self.clone()
        }
    }

    /// Wire form (everything except the id, which is the store key).
    pub fn to_node(&self) -> Map<String, Value> {
        let mut node = Map::new();
        node.insert(Field::Name.to_string(), Value::from(self.name.clone()));
        node.insert(Field::Content.to_string(), Value::from(self.content.clone()));
        node.insert(Field::LastModified.to_string(), Value::from(self.last_modified));
        node.insert(Field::Size.to_string(), Value::from(self.size));
        node.insert(Field::Type.to_string(), Value::from(self.file_type.clone()));
        node
    }

    /// Parse a wire node stored under `id`.
    ///
    /// `name`, `content` and `lastModified` are required. `size` and `type`
    /// are recomputed when a peer omitted them.
    pub fn from_node(id: FileId, node: &Map<String, Value>) -> Result<Self, ValidationError> {
        let name = read_str(node, Field::Name)?;
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let content = read_str(node, Field::Content)?;
        let last_modified = read_u64(node, Field::LastModified)?;
        if last_modified > MAX_TIMESTAMP_MS {
            return Err(ValidationError::OutOfRange(Field::LastModified));
        }
        let size = match node.get(Field::Size.as_ref()) {
            Some(_) => read_u64(node, Field::Size)?,
            None => byte_size(&content),
        };
        let file_type = match node.get(Field::Type.as_ref()) {
            Some(_) => read_str(node, Field::Type)?,
            None => file_type_for(&name),
        };
        Ok(Self { id, name, content, last_modified, size, file_type })
    }
}

fn read_str(node: &Map<String, Value>, field: Field) -> Result<String, ValidationError> {
    match node.get(field.as_ref()) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::WrongType { field, expected: "a string" }),
    }
}

fn read_u64(node: &Map<String, Value>, field: Field) -> Result<u64, ValidationError> {
    let wrong = ValidationError::WrongType { field, expected: "a non-negative number" };
    match node.get(field.as_ref()) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        // Browser peers write JS numbers, which may arrive as floats.
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
            .ok_or(wrong),
        Some(_) => Err(wrong),
    }
}

/// A file record or its tombstone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    Present(FileRecord),
    Tombstone,
}

impl Record {
    /// Validate a delivered node.
    ///
    /// A missing node is a tombstone. A present node that doesn't parse is an
    /// error; callers on the subscription path downgrade it to a tombstone.
    pub fn from_node(id: &FileId, node: Option<&Map<String, Value>>) -> Result<Self, ValidationError> {
        match node {
            None => Ok(Record::Tombstone),
            Some(node) => FileRecord::from_node(id.clone(), node).map(Record::Present),
        }
    }

    pub fn as_present(&self) -> Option<&FileRecord> {
        match self {
            Record::Present(file) => Some(file),
            Record::Tombstone => None,
        }
    }

    pub fn into_present(self) -> Option<FileRecord> {
        match self {
            Record::Present(file) => Some(file),
            Record::Tombstone => None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Record::Tombstone)
    }
}

/// Partial update written when an open file is saved.
///
/// Only `content`, `lastModified` and `size` go over the wire; the store
/// merges them into the existing node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentPatch {
    pub content: String,
    pub last_modified: u64,
    pub size: u64,
}

impl ContentPatch {
    /// Patch stamped now.
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            size: byte_size(&content),
            last_modified: crate::now_millis(),
            content,
        }
    }

    pub fn to_node(&self) -> Map<String, Value> {
        let mut node = Map::new();
        node.insert(Field::Content.to_string(), Value::from(self.content.clone()));
        node.insert(Field::LastModified.to_string(), Value::from(self.last_modified));
        node.insert(Field::Size.to_string(), Value::from(self.size));
        node
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> FileId {
        FileId::new(s).unwrap()
    }

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_derived_fields() {
        let rec = FileRecord::with_timestamp(id("x"), "a.txt", "hi", 5);
        assert_eq!(rec.size, 2);
        assert_eq!(rec.file_type, "TXT");

        let rec = FileRecord::with_timestamp(id("x"), "notes.md", "héllo", 5);
        assert_eq!(rec.size, 6, "size counts UTF-8 bytes");
        assert_eq!(rec.file_type, "MD");
    }

    #[test]
    fn test_file_type_edge_cases() {
        assert_eq!(file_type_for("trailing."), "TXT");
        assert_eq!(file_type_for("Makefile"), "TXT");
        assert_eq!(file_type_for("script.Py"), "PY");
    }

    #[test]
    fn test_node_excludes_id() {
        let rec = FileRecord::with_timestamp(id("abc"), "a.txt", "hi", 7);
        let node = rec.to_node();
        assert!(!node.contains_key("id"));
        assert_eq!(node["lastModified"], json!(7));
        assert_eq!(node["type"], json!("TXT"));
        assert_eq!(FileRecord::from_node(id("abc"), &node).unwrap(), rec);
    }

    #[test]
    fn test_from_node_fills_missing_derived_fields() {
        let node = obj(json!({"name": "b.rs", "content": "fn", "lastModified": 1}));
        let rec = FileRecord::from_node(id("k"), &node).unwrap();
        assert_eq!(rec.size, 2);
        assert_eq!(rec.file_type, "RS");
    }

    #[test]
    fn test_from_node_accepts_float_timestamps() {
        let node = obj(json!({"name": "a", "content": "", "lastModified": 1700000000000.0}));
        let rec = FileRecord::from_node(id("k"), &node).unwrap();
        assert_eq!(rec.last_modified, 1_700_000_000_000);
    }

    #[test]
    fn test_from_node_rejects_malformed() {
        let missing_name = obj(json!({"content": "x", "lastModified": 1}));
        assert_eq!(
            FileRecord::from_node(id("k"), &missing_name),
            Err(ValidationError::MissingField(Field::Name))
        );

        let wrong_content = obj(json!({"name": "a", "content": 3, "lastModified": 1}));
        assert!(matches!(
            FileRecord::from_node(id("k"), &wrong_content),
            Err(ValidationError::WrongType { field: Field::Content, .. })
        ));

        let negative = obj(json!({"name": "a", "content": "", "lastModified": -4}));
        assert!(FileRecord::from_node(id("k"), &negative).is_err());

        let empty_name = obj(json!({"name": "", "content": "", "lastModified": 1}));
        assert_eq!(FileRecord::from_node(id("k"), &empty_name), Err(ValidationError::EmptyName));
    }

    #[test]
    fn test_from_node_rejects_far_future_timestamps() {
        let huge = obj(json!({"name": "a", "content": "", "lastModified": 1e300}));
        assert_eq!(
            FileRecord::from_node(id("k"), &huge),
            Err(ValidationError::OutOfRange(Field::LastModified))
        );

        let year_10000 = obj(json!({"name": "a", "content": "", "lastModified": MAX_TIMESTAMP_MS + 1}));
        assert!(FileRecord::from_node(id("k"), &year_10000).is_err());

        let last = obj(json!({"name": "a", "content": "", "lastModified": MAX_TIMESTAMP_MS}));
        assert_eq!(FileRecord::from_node(id("k"), &last).unwrap().last_modified, MAX_TIMESTAMP_MS);
    }

    #[test]
    fn test_record_from_missing_node_is_tombstone() {
        assert_eq!(Record::from_node(&id("k"), None), Ok(Record::Tombstone));
    }

    #[test]
    fn test_same_revision_ignores_name() {
        let a = FileRecord::with_timestamp(id("k"), "a.txt", "hi", 1);
        let mut b = a.clone();
        b.name = "renamed.txt".into();
        assert!(a.same_revision(&b));
        b.last_modified = 2;
        assert!(!a.same_revision(&b));
    }

    #[test]
    fn test_patch_keeps_identity() {
        let rec = FileRecord::with_timestamp(id("k"), "a.txt", "hi", 1);
        let patch = ContentPatch { content: "hello".into(), last_modified: 9, size: 5 };
        let patched = rec.patched(&patch);
        assert_eq!(patched.id, rec.id);
        assert_eq!(patched.name, "a.txt");
        assert_eq!(patched.content, "hello");
        assert_eq!(patched.size, 5);

        let node = patch.to_node();
        assert_eq!(node.len(), 3);
        assert!(!node.contains_key("name"));
    }
}
