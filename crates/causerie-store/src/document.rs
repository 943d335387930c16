//! Document addressing and merge patches.
//!
//! The store keeps schemaless JSON documents grouped into named collections.
//! A [`Patch`] is an ordered set of field operations keyed by dotted paths
//! (`typing.alice-uid`), which is how callers touch one entry of a nested map
//! without rewriting its siblings.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// A collection reference such as `chats` or `chats/{id}/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(pub String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Address a single document inside this collection.
    pub fn doc(&self, id: impl Into<String>) -> DocumentPath {
        DocumentPath {
            collection: self.clone(),
            id: id.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollectionPath {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}

/// A fully qualified document reference (`collection/id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    pub collection: CollectionPath,
    pub id: String,
}

impl DocumentPath {
    pub fn new(collection: impl Into<CollectionPath>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// A collection nested under this document, e.g. the `messages` of a chat.
    pub fn subcollection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}/{}", self.collection, self.id, name))
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A document snapshot: its id within the collection plus the raw JSON data.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Deserialize the payload into a typed struct.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

// ---------------------------------------------------------------------------
// Field operations
// ---------------------------------------------------------------------------

/// One mutation applied to a single (possibly dotted) field path.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Write the value, replacing whatever was there.
    Set(Value),
    /// Remove the field entirely.
    Delete,
    /// Write the store's commit-time clock as an RFC 3339 string.
    ServerTimestamp,
    /// Append each element that is not already present.
    ArrayUnion(Vec<Value>),
    /// Drop every occurrence of each element.
    ArrayRemove(Vec<Value>),
}

/// A merge patch: field paths mapped to operations.
///
/// Applying a patch never touches fields it does not name.  Dotted paths
/// descend into nested objects, creating intermediate objects as needed and
/// replacing non-object values that stand in the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub ops: BTreeMap<String, FieldOp>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a patch of top-level `Set` operations from a JSON object.
    /// Non-object values produce an empty patch.
    pub fn from_value(value: Value) -> Self {
        let mut patch = Self::new();
        if let Value::Object(map) = value {
            for (field, value) in map {
                patch.ops.insert(field, FieldOp::Set(value));
            }
        }
        patch
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.insert(field.into(), FieldOp::Set(value.into()));
        self
    }

    pub fn delete(mut self, field: impl Into<String>) -> Self {
        self.ops.insert(field.into(), FieldOp::Delete);
        self
    }

    pub fn server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.ops.insert(field.into(), FieldOp::ServerTimestamp);
        self
    }

    pub fn array_union(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.ops.insert(field.into(), FieldOp::ArrayUnion(values));
        self
    }

    pub fn array_remove(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.ops.insert(field.into(), FieldOp::ArrayRemove(values));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every operation to `data` in place, resolving `ServerTimestamp`
    /// against `now`.
    pub fn apply(&self, data: &mut Value, now: DateTime<Utc>) {
        if !data.is_object() {
            *data = Value::Object(Map::new());
        }
        for (path, op) in &self.ops {
            apply_one(data, path, op, now);
        }
    }
}

fn apply_one(data: &mut Value, path: &str, op: &FieldOp, now: DateTime<Utc>) {
    if !data.is_object() {
        *data = Value::Object(Map::new());
    }
    let Some(map) = data.as_object_mut() else {
        return;
    };

    // Descend one dotted segment at a time until `path` is a plain key.
    if let Some((head, rest)) = path.split_once('.') {
        let child = map
            .entry(head)
            .or_insert_with(|| Value::Object(Map::new()));
        apply_one(child, rest, op, now);
        return;
    }
    let leaf = path;

    match op {
        FieldOp::Set(value) => {
            map.insert(leaf.to_string(), value.clone());
        }
        FieldOp::Delete => {
            map.remove(leaf);
        }
        FieldOp::ServerTimestamp => {
            map.insert(leaf.to_string(), timestamp_value(now));
        }
        FieldOp::ArrayUnion(values) => {
            let entry = map
                .entry(leaf)
                .or_insert_with(|| Value::Array(Vec::new()));
            if !entry.is_array() {
                *entry = Value::Array(Vec::new());
            }
            if let Some(items) = entry.as_array_mut() {
                for value in values {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
            }
        }
        FieldOp::ArrayRemove(values) => {
            let entry = map
                .entry(leaf)
                .or_insert_with(|| Value::Array(Vec::new()));
            if !entry.is_array() {
                *entry = Value::Array(Vec::new());
            }
            if let Some(items) = entry.as_array_mut() {
                items.retain(|item| !values.contains(item));
            }
        }
    }
}

/// Serialize a server timestamp.  Fixed-width microsecond precision so the
/// strings sort the same way the instants do.
pub(crate) fn timestamp_value(now: DateTime<Utc>) -> Value {
    Value::String(now.to_rfc3339_opts(SecondsFormat::Micros, true))
}
