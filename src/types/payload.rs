//! Payload nodes and normalized payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::keys::KeyTransform;
use crate::reconcile::PlaceholderKeys;

/// One entity's data as an ordered field map.
///
/// Raw (wire) nodes use external keys; decoded nodes use internal keys.
pub type PayloadNode = serde_json::Map<String, Value>;

/// Flat records extracted from a nested payload, bucketed by type name.
///
/// Buckets are keyed by type, never by root key, so a type that embeds
/// itself cannot clobber the root. Within a bucket, records keep encounter
/// order and duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sideloads {
    buckets: BTreeMap<String, Vec<PayloadNode>>,
}

impl Sideloads {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a flat record to its type's bucket.
    pub fn push(&mut self, type_name: &str, node: PayloadNode) {
        self.buckets.entry(type_name.to_string()).or_default().push(node);
    }

    /// Records in a bucket (empty if the bucket does not exist).
    pub fn bucket(&self, type_name: &str) -> &[PayloadNode] {
        self.buckets
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether a bucket exists for a type.
    pub fn has_bucket(&self, type_name: &str) -> bool {
        self.buckets.contains_key(type_name)
    }

    /// Type names with a bucket, in sorted order.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    /// Total number of sideloaded records.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Whether nothing was sideloaded.
    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Vec::is_empty)
    }

    /// Iterate buckets.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[PayloadNode])> {
        self.buckets.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Render as top-level payload keys, one per bucket.
    pub fn to_json<K: KeyTransform + ?Sized>(&self, keys: &K) -> PayloadNode {
        self.buckets
            .iter()
            .map(|(type_name, records)| {
                let records = records.iter().cloned().map(Value::Object).collect();
                (keys.bucket_key(type_name), Value::Array(records))
            })
            .collect()
    }
}

impl IntoIterator for Sideloads {
    type Item = (String, Vec<PayloadNode>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Vec<PayloadNode>>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.into_iter()
    }
}

/// A single-root payload after flattening and decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPayload {
    /// Type of the root record.
    pub type_name: String,
    /// Decoded root record; embedded relations hold id lists.
    pub root: PayloadNode,
    /// Decoded records extracted from the payload.
    pub sideloads: Sideloads,
    /// Keys of sideloaded records referenced only by a placeholder.
    #[serde(skip)]
    pub placeholders: PlaceholderKeys,
}

impl NormalizedPayload {
    /// Render as `{ <bucket>: [...], ..., <type>: root }`.
    pub fn to_json<K: KeyTransform + ?Sized>(&self, keys: &K) -> Value {
        let mut out = self.sideloads.to_json(keys);
        out.insert(self.type_name.clone(), Value::Object(self.root.clone()));
        Value::Object(out)
    }
}

/// A multi-root payload after flattening and decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCollection {
    /// Type of the root records.
    pub type_name: String,
    /// Decoded root records, in payload order.
    pub roots: Vec<PayloadNode>,
    /// Decoded records extracted from all roots.
    pub sideloads: Sideloads,
    /// Keys of sideloaded records referenced only by a placeholder.
    #[serde(skip)]
    pub placeholders: PlaceholderKeys,
}

impl NormalizedCollection {
    /// Render as `{ <bucket>: [...], ..., <plural type>: [roots] }`.
    ///
    /// Roots are rendered under the type's bucket key; sideloads of the same
    /// type are kept apart under `_<bucket key>`.
    pub fn to_json<K: KeyTransform + ?Sized>(&self, keys: &K) -> Value {
        let mut out = PayloadNode::new();
        let root_key = keys.bucket_key(&self.type_name);
        for (key, records) in self.sideloads.to_json(keys) {
            if key == root_key {
                out.insert(format!("_{key}"), records);
            } else {
                out.insert(key, records);
            }
        }
        let roots = self.roots.iter().cloned().map(Value::Object).collect();
        out.insert(root_key, Value::Array(roots));
        Value::Object(out)
    }
}
