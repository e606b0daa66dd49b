//! Outbound pass: record graph → nested payload.

use serde_json::Value;

use super::{BaseSerializer, EmbedError, EmbeddedEncoding};
use crate::keys::KeyTransform;
use crate::reconcile::ReconciliationMap;
use crate::store::RecordStore;
use crate::types::{PayloadNode, Record, RecordKey, Relationship};

/// State of one embedding pass.
pub(crate) struct Embedder<'a, E: ?Sized, S: ?Sized> {
    encoding: &'a E,
    store: &'a S,
    clients: &'a mut ReconciliationMap,
    /// Records that received a fresh placeholder in this pass.
    assigned: Vec<RecordKey>,
}

impl<'a, E, S> Embedder<'a, E, S>
where
    E: EmbeddedEncoding + ?Sized,
    S: RecordStore + ?Sized,
{
    pub(crate) fn new(encoding: &'a E, store: &'a S, clients: &'a mut ReconciliationMap) -> Self {
        Self {
            encoding,
            store,
            clients,
            assigned: Vec::new(),
        }
    }

    /// Serialize a record with its `always` relations inlined.
    pub(crate) fn serialize(&mut self, key: RecordKey, include_id: bool, depth: usize) -> Result<PayloadNode, EmbedError> {
        let encoding = self.encoding;
        let store = self.store;
        let record = store.record(key).ok_or(EmbedError::RecordNotFound(key))?;
        let descriptor = encoding.descriptor(&record.type_name)?;

        let max_depth = encoding.config().max_depth;
        if depth > max_depth {
            return Err(EmbedError::DepthExceeded {
                type_name: descriptor.name.clone(),
                max_depth,
            });
        }

        let base = encoding.base();
        let mut node = base.serialize_fields(store, descriptor, record);
        if include_id {
            if let Some(id) = &record.id {
                node.insert(base.primary_key().to_string(), id.to_value());
            }
        }

        for rel in descriptor.embedded_outbound() {
            let children = self.embed(record, rel, depth)?;
            let wire_key = base.keys().key_for_relationship(&rel.key, rel.kind);
            node.insert(wire_key, Value::Array(children.into_iter().map(Value::Object).collect()));
        }

        Ok(node)
    }

    /// Inline the children of `rel` on `parent`, tagging each with its id or
    /// a placeholder.
    pub(crate) fn embed(&mut self, parent: &Record, rel: &Relationship, depth: usize) -> Result<Vec<PayloadNode>, EmbedError> {
        let encoding = self.encoding;
        let store = self.store;
        let primary_key = encoding.base().primary_key();
        let client_id_key = &encoding.config().client_id_key;

        let related = parent.related(&rel.key);
        let mut children = Vec::with_capacity(related.len());
        for &child_key in related {
            let mut child = self.serialize(child_key, false, depth + 1)?;
            let record = store.record(child_key).ok_or(EmbedError::RecordNotFound(child_key))?;

            match &record.id {
                Some(id) => {
                    child.insert(primary_key.to_string(), id.to_value());
                }
                None => {
                    if self.clients.client_id_of(child_key).is_none() {
                        self.assigned.push(child_key);
                    }
                    let client_id = self.clients.placeholder_for(child_key);
                    child.insert(client_id_key.clone(), client_id.to_value());
                }
            }
            children.push(child);
        }

        tracing::debug!(
            type_name = %parent.type_name,
            relationship = %rel.key,
            children = children.len(),
            depth = depth,
            "embedded relation"
        );

        Ok(children)
    }

    /// Withdraw this pass's fresh placeholders if it failed.
    pub(crate) fn settle<T>(self, result: Result<T, EmbedError>) -> Result<T, EmbedError> {
        if result.is_err() {
            for key in self.assigned {
                self.clients.discard(key);
            }
        }
        result
    }
}
