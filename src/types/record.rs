//! Record identity types and the in-memory record shape.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::payload::PayloadNode;

/// Store-local handle for a record.
///
/// Stable for the record's lifetime in a store, whether or not the record
/// has been persisted. Wraps a UUID and implements `Ord` for deterministic
/// ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey(Uuid);

impl RecordKey {
    /// Create a key from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a fresh random key.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RecordKey {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Durable, server-assigned identifier.
///
/// Numeric ids on the wire are coerced to their decimal string form so that
/// `1` and `"1"` name the same record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create an id from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Read an id from a payload value.
    ///
    /// Returns `None` for `null`, empty strings and non-scalar values.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Payload representation of this id.
    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Placeholder id handed out for a record that has no durable id yet.
///
/// Issued tokens are random UUIDs, so they never collide with ids a server
/// assigns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Create a placeholder from a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Issue a fresh placeholder.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Read a placeholder from a payload value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// Borrow the token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Payload representation of this placeholder.
    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An entity resident in a record store.
///
/// Attribute keys are in internal (camelCase) form. Has-many references are
/// kept as ordered store keys so unpersisted children can be referenced
/// before they have a durable id.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Store-local handle.
    pub key: RecordKey,
    /// Type name, as registered in the schema.
    pub type_name: String,
    /// Durable id, once the server has assigned one.
    pub id: Option<RecordId>,
    /// Attribute values by internal key.
    pub attributes: PayloadNode,
    /// Has-many references by relationship key, in relation order.
    pub has_many: BTreeMap<String, Vec<RecordKey>>,
}

impl Record {
    /// Create a new, unpersisted record.
    pub fn new(key: RecordKey, type_name: impl Into<String>) -> Self {
        Self {
            key,
            type_name: type_name.into(),
            id: None,
            attributes: PayloadNode::new(),
            has_many: BTreeMap::new(),
        }
    }

    /// Whether the record has a durable id.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Get an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Related record keys for a has-many relationship (empty if unset).
    pub fn related(&self, relationship: &str) -> &[RecordKey] {
        self.has_many
            .get(relationship)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
