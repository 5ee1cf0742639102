//! Opaque draft payload documents
//!
//! A [`Document`] is an order-preserving JSON object captured from the form.
//! The draft store never looks inside it; the only operation it performs on
//! the content is [`Document::checksum`].

use crate::error::{MetadraftError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Order-preserving key → value(s) document.
///
/// Keys keep insertion order when serialized (`serde_json/preserve_order`),
/// so a restored draft lists fields in the order the form produced them.
///
/// # Examples
///
/// ```
/// use metadraft::payload::Document;
/// use serde_json::json;
///
/// let doc = Document::from_value(json!({"title": "Test dataset", "keywords": ["ice", "snow"]})).unwrap();
/// assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["title", "keywords"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value, rejecting anything that is not an object.
    ///
    /// # Errors
    ///
    /// Returns `MetadraftError::InvalidPayload` for `null`, arrays, and scalars.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Err(MetadraftError::InvalidPayload("payload is missing".into()).into()),
            other => Err(MetadraftError::InvalidPayload(format!(
                "payload must be an object, got {}",
                json_kind(&other)
            ))
            .into()),
        }
    }

    /// Insert or replace a top-level entry, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Look up a top-level entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether a top-level key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Top-level keys in document order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the document has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a plain JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Deterministic SHA-256 content hash, hex encoded.
    ///
    /// Object keys are hashed in sorted order at every nesting level, so two
    /// documents that compare equal always produce the same checksum no
    /// matter which order their keys were inserted in. Array order is
    /// significant.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hash_object(&self.0, &mut hasher);
        format!("{:x}", hasher.finalize())
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Document {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// Each node is tagged so `["a"]` and `"a"` (or `{}` and `[]`) never collide.
fn hash_value(value: &Value, hasher: &mut Sha256) {
    match value {
        Value::Null => hasher.update(b"n"),
        Value::Bool(b) => hasher.update(if *b { b"t" } else { b"f" }),
        Value::Number(n) => {
            let repr = n.to_string();
            hasher.update(b"d");
            hasher.update((repr.len() as u64).to_be_bytes());
            hasher.update(repr.as_bytes());
        }
        Value::String(s) => hash_str(b"s", s, hasher),
        Value::Array(items) => {
            hasher.update(b"a");
            hasher.update((items.len() as u64).to_be_bytes());
            for item in items {
                hash_value(item, hasher);
            }
        }
        Value::Object(map) => hash_object(map, hasher),
    }
}

fn hash_object(map: &Map<String, Value>, hasher: &mut Sha256) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    hasher.update(b"o");
    hasher.update((keys.len() as u64).to_be_bytes());
    for key in keys {
        hash_str(b"k", key, hasher);
        hash_value(&map[key.as_str()], hasher);
    }
}

fn hash_str(tag: &[u8], s: &str, hasher: &mut Sha256) {
    hasher.update(tag);
    hasher.update((s.len() as u64).to_be_bytes());
    hasher.update(s.as_bytes());
}
