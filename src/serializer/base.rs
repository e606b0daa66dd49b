//! Plain per-record serialization, with no embedding.

use serde_json::Value;

use crate::keys::{KeyTransform, UnderscoreKeys};
use crate::store::RecordStore;
use crate::types::{PayloadNode, Record, RelationshipKind, TypeDescriptor};
use crate::PRIMARY_KEY;

/// Field-level encode/decode the embedded layer delegates to.
pub trait BaseSerializer {
    /// Key naming in effect.
    type Keys: KeyTransform;

    /// Key naming in effect.
    fn keys(&self) -> &Self::Keys;

    /// Wire name of the primary key.
    fn primary_key(&self) -> &str {
        PRIMARY_KEY
    }

    /// Encode a record's attributes and references under wire keys.
    ///
    /// The primary key is not written; callers attach it when wanted.
    fn serialize_fields<S: RecordStore + ?Sized>(&self, store: &S, descriptor: &TypeDescriptor, record: &Record) -> PayloadNode;

    /// Decode a flat wire node into internal keys.
    fn normalize_fields(&self, descriptor: &TypeDescriptor, node: PayloadNode) -> PayloadNode;
}

/// JSON field codec parameterized by key naming.
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer<K = UnderscoreKeys> {
    keys: K,
}

impl<K: KeyTransform> JsonSerializer<K> {
    /// Create a codec with the given key naming.
    pub fn new(keys: K) -> Self {
        Self { keys }
    }
}

impl<K: KeyTransform> BaseSerializer for JsonSerializer<K> {
    type Keys = K;

    fn keys(&self) -> &K {
        &self.keys
    }

    fn serialize_fields<S: RecordStore + ?Sized>(&self, store: &S, descriptor: &TypeDescriptor, record: &Record) -> PayloadNode {
        let mut node = PayloadNode::new();

        for attribute in &descriptor.attributes {
            if let Some(value) = record.attribute(attribute) {
                node.insert(self.keys.key_for_attribute(attribute), value.clone());
            }
        }

        for rel in &descriptor.relationships {
            let wire_key = self.keys.key_for_relationship(&rel.key, rel.kind);
            match rel.kind {
                // Unpersisted children have nothing to reference by.
                RelationshipKind::HasMany => {
                    let ids = record
                        .related(&rel.key)
                        .iter()
                        .filter_map(|key| store.record(*key))
                        .filter_map(|child| child.id.as_ref())
                        .map(|id| id.to_value())
                        .collect();
                    node.insert(wire_key, Value::Array(ids));
                }
                RelationshipKind::BelongsTo => {
                    if let Some(value) = record.attribute(&rel.key) {
                        node.insert(wire_key, value.clone());
                    }
                }
            }
        }

        node
    }

    fn normalize_fields(&self, _descriptor: &TypeDescriptor, node: PayloadNode) -> PayloadNode {
        node.into_iter()
            .map(|(key, value)| (self.keys.internal_key(&key), value))
            .collect()
    }
}
