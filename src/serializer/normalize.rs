//! Inbound pass: nested payload → flat root + sideloads.
//!
//! ## Algorithm
//!
//! For each has-many relationship embedded inbound (`always` or `load`):
//!
//! 1. Skip it if the node has no value under the relation's wire key
//! 2. For each child, in order:
//!    - Flatten the child first (its own children are sideloaded before it)
//!    - If it echoes a live placeholder, queue a save confirmation for the
//!      resident record instead of sideloading it
//!    - Otherwise append it to its type's bucket
//! 3. Replace the nested field with the ordered id list
//!
//! Records sideloaded at the top level of a response go through the same
//! placeholder matching.
//!
//! ## Writes
//!
//! Nothing is written until the whole payload has flattened. Then:
//!
//! 1. Every confirmation is checked with [`RecordStore::check_save`]
//! 2. Records referenced only by a stale placeholder get their reserved keys
//! 3. Confirmations are saved, then sideloads ingested
//! 4. Confirmed placeholders drain from the map
//!
//! A failure in step 1 leaves the store and the map untouched. A failure
//! after it leaves every placeholder live.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::{value_kind, BaseSerializer, EmbedError, EmbeddedEncoding};
use crate::keys::KeyTransform;
use crate::reconcile::{PlaceholderKeys, ReconciliationMap};
use crate::store::RecordStore;
use crate::types::{ClientId, PayloadNode, RecordId, RecordKey, Sideloads, TypeDescriptor};

/// A resident placeholder record the response confirmed.
struct Confirmation {
    client_id: ClientId,
    record: RecordKey,
    type_name: String,
    id: RecordId,
    data: PayloadNode,
}

/// State of one flattening pass.
pub(crate) struct Flattener<'a, E: ?Sized> {
    encoding: &'a E,
    clients: &'a mut ReconciliationMap,
    sideloads: Sideloads,
    confirmations: Vec<Confirmation>,
    /// Placeholders matched earlier in this pass.
    claimed: BTreeSet<ClientId>,
    /// Keys for children referenced only by a stale placeholder.
    placeholders: PlaceholderKeys,
    /// (type, bucket index) of those children.
    reserved: BTreeMap<(String, usize), RecordKey>,
}

impl<'a, E: EmbeddedEncoding + ?Sized> Flattener<'a, E> {
    pub(crate) fn new(encoding: &'a E, clients: &'a mut ReconciliationMap) -> Self {
        Self {
            encoding,
            clients,
            sideloads: Sideloads::new(),
            confirmations: Vec::new(),
            claimed: BTreeSet::new(),
            placeholders: PlaceholderKeys::new(),
            reserved: BTreeMap::new(),
        }
    }

    /// Flatten `node` in place.
    pub(crate) fn flatten(&mut self, descriptor: &TypeDescriptor, node: &mut PayloadNode, depth: usize) -> Result<(), EmbedError> {
        let encoding = self.encoding;
        let max_depth = encoding.config().max_depth;
        if depth > max_depth {
            return Err(EmbedError::DepthExceeded {
                type_name: descriptor.name.clone(),
                max_depth,
            });
        }

        let keys = encoding.base().keys();
        for rel in descriptor.embedded_inbound() {
            let wire_key = keys.key_for_relationship(&rel.key, rel.kind);
            let children = match node.get_mut(&wire_key).map(Value::take) {
                None | Some(Value::Null) => continue,
                Some(Value::Array(children)) => children,
                Some(other) => {
                    return Err(EmbedError::malformed(
                        &descriptor.name,
                        &wire_key,
                        format!("expected an array, found {}", value_kind(&other)),
                    ))
                }
            };

            let target = encoding.descriptor(&rel.target_type)?;
            let count = children.len();
            let mut ids = Vec::with_capacity(count);
            for child in children {
                let Value::Object(mut child) = child else {
                    return Err(EmbedError::malformed(&descriptor.name, &wire_key, "expected an array of objects"));
                };
                self.flatten(target, &mut child, depth + 1)?;
                let reference = self
                    .place(target, &rel.key, child)?
                    .ok_or_else(|| EmbedError::MissingIdentifier {
                        type_name: target.name.clone(),
                        relationship: rel.key.clone(),
                    })?;
                ids.push(reference);
            }

            tracing::debug!(
                type_name = %descriptor.name,
                relationship = %rel.key,
                children = count,
                depth = depth,
                "flattened embedded relation"
            );

            if wire_key != rel.key {
                node.shift_remove(&wire_key);
            }
            node.insert(rel.key.clone(), Value::Array(ids));
        }

        Ok(())
    }

    /// Flatten records sideloaded at the top level of a payload.
    ///
    /// Any key other than `root_key` that is the plural root key of a
    /// registered type is read as an array of that type's records.
    pub(crate) fn flatten_top_level(&mut self, payload: &mut PayloadNode, root_key: &str) -> Result<(), EmbedError> {
        let encoding = self.encoding;
        let keys = encoding.base().keys();

        for descriptor in encoding.schema().iter() {
            let bucket_key = keys.plural_root_key(&descriptor.name);
            if bucket_key == root_key {
                continue;
            }
            let records = match payload.remove(&bucket_key) {
                None | Some(Value::Null) => continue,
                Some(Value::Array(records)) => records,
                Some(other) => {
                    return Err(EmbedError::malformed(
                        &descriptor.name,
                        &bucket_key,
                        format!("expected an array, found {}", value_kind(&other)),
                    ))
                }
            };

            for record in records {
                let Value::Object(mut record) = record else {
                    return Err(EmbedError::malformed(&descriptor.name, &bucket_key, "expected an array of objects"));
                };
                self.flatten(descriptor, &mut record, 0)?;
                self.place(descriptor, &bucket_key, record)?;
            }
        }

        Ok(())
    }

    /// Sideload a flattened record or queue its confirmation.
    ///
    /// Returns the value to reference the record by, if it has one. `field`
    /// names where the record was found, for errors.
    fn place(&mut self, target: &TypeDescriptor, field: &str, mut child: PayloadNode) -> Result<Option<Value>, EmbedError> {
        let encoding = self.encoding;
        let client_id_key = &encoding.config().client_id_key;
        let primary_key = encoding.base().primary_key();
        let id = child.get(primary_key).and_then(RecordId::from_value);
        let client_id = child.get(client_id_key).and_then(ClientId::from_value);

        if let Some(client_id) = &client_id {
            let live = self.clients.get(client_id).filter(|_| !self.claimed.contains(client_id));
            if let Some(record) = live {
                let id = id.ok_or_else(|| EmbedError::MissingIdentifier {
                    type_name: target.name.clone(),
                    relationship: field.to_string(),
                })?;
                child.shift_remove(client_id_key);
                self.claimed.insert(client_id.clone());
                let reference = id.to_value();
                self.confirmations.push(Confirmation {
                    client_id: client_id.clone(),
                    record,
                    type_name: target.name.clone(),
                    id,
                    data: child,
                });
                return Ok(Some(reference));
            }

            tracing::trace!(
                client_id = %client_id,
                type_name = %target.name,
                "placeholder not live, sideloading as a new record"
            );
            child.shift_remove(client_id_key);
        }

        let reference = match (id, client_id) {
            (Some(id), _) => Some(id.to_value()),
            (None, Some(client_id)) => {
                let key = self.placeholders.key_for(&target.name, &client_id);
                let index = self.sideloads.bucket(&target.name).len();
                self.reserved.insert((target.name.clone(), index), key);
                Some(client_id.to_value())
            }
            (None, None) => None,
        };

        self.sideloads.push(&target.name, child);
        Ok(reference)
    }

    /// Decode every confirmation and check the store would accept it.
    fn check<S: RecordStore>(&mut self, store: &S) -> Result<(), EmbedError> {
        let encoding = self.encoding;
        let base = encoding.base();
        let mut assigned = BTreeSet::new();

        for confirmation in &mut self.confirmations {
            let descriptor = encoding.descriptor(&confirmation.type_name)?;
            confirmation.data = base.normalize_fields(descriptor, std::mem::take(&mut confirmation.data));

            if !assigned.insert((confirmation.type_name.clone(), confirmation.id.clone())) {
                return Err(EmbedError::ConflictingIdentity {
                    type_name: confirmation.type_name.clone(),
                    id: confirmation.id.clone(),
                });
            }
            store
                .check_save(descriptor, confirmation.record, &confirmation.data)
                .map_err(EmbedError::from_store)?;
        }
        Ok(())
    }

    /// Create the records reserved for stale placeholders, empty.
    fn reserve<S: RecordStore>(&self, store: &mut S) -> Result<(), EmbedError> {
        for (type_name, key) in self.placeholders.iter() {
            let descriptor = self.encoding.descriptor(type_name)?;
            store
                .ingest_at(descriptor, key, PayloadNode::new(), &self.placeholders)
                .map_err(EmbedError::from_store)?;
        }
        Ok(())
    }

    /// Apply checked confirmations to the store.
    fn save<S: RecordStore>(&mut self, store: &mut S) -> Result<(), EmbedError> {
        let encoding = self.encoding;
        for confirmation in &mut self.confirmations {
            let descriptor = encoding.descriptor(&confirmation.type_name)?;
            let data = std::mem::take(&mut confirmation.data);
            store
                .did_save(descriptor, confirmation.record, data, &self.placeholders)
                .map_err(EmbedError::from_store)?;
        }
        Ok(())
    }

    /// Drain confirmed placeholders from the map.
    fn drain(&mut self) {
        for confirmation in std::mem::take(&mut self.confirmations) {
            self.clients.confirm(&confirmation.client_id);

            tracing::debug!(
                client_id = %confirmation.client_id,
                record = %confirmation.record,
                type_name = %confirmation.type_name,
                id = %confirmation.id,
                "reconciled placeholder with saved record"
            );
        }
    }

    /// Apply queued save confirmations and drain their placeholders.
    ///
    /// Sideloads are left as they are.
    pub(crate) fn confirm<S: RecordStore>(&mut self, store: &mut S) -> Result<(), EmbedError> {
        if self.confirmations.is_empty() {
            return Ok(());
        }
        self.check(store)?;
        self.reserve(store)?;
        self.save(store)?;
        self.drain();
        Ok(())
    }

    /// Raw (wire form) sideloads collected so far.
    pub(crate) fn into_sideloads(self) -> Sideloads {
        self.sideloads
    }

    /// Confirm placeholders, then decode and ingest every sideload.
    pub(crate) fn finish<S: RecordStore>(mut self, store: &mut S) -> Result<(Sideloads, PlaceholderKeys), EmbedError> {
        self.check(store)?;
        self.reserve(store)?;
        self.save(store)?;

        let encoding = self.encoding;
        let base = encoding.base();
        let mut decoded = Sideloads::new();
        for (type_name, records) in std::mem::take(&mut self.sideloads) {
            let descriptor = encoding.descriptor(&type_name)?;
            for (index, record) in records.into_iter().enumerate() {
                let record = base.normalize_fields(descriptor, record);
                let written = match self.reserved.get(&(type_name.clone(), index)) {
                    Some(&key) => store.ingest_at(descriptor, key, record.clone(), &self.placeholders),
                    None => store
                        .ingest(descriptor, record.clone(), &self.placeholders)
                        .map(|_| ()),
                };
                written.map_err(EmbedError::from_store)?;
                decoded.push(&type_name, record);
            }
        }

        self.drain();
        Ok((decoded, std::mem::take(&mut self.placeholders)))
    }
}
