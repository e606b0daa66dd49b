//! Embedded-association serialization.
//!
//! [`EmbeddedEncoding`] layers the embedded transform over a
//! [`BaseSerializer`]. Field-level work is always reached through
//! `self.base()`; the layer only handles relations whose policy embeds them.
//!
//! ## Inbound
//!
//! ```text
//! { home_planet: { id, name, villains: [{ id, first_name }] } }
//!        │ flatten (depth-first)
//!        ▼
//! root { id, name, villains: ["1"] }  +  superVillain: [{ id, firstName }]
//! ```
//!
//! ## Outbound
//!
//! Every `always` relation is inlined. Children with an id carry it; the
//! rest carry a placeholder registered in the [`ReconciliationMap`].

pub mod base;
pub mod embed;
pub mod normalize;

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::EmbedConfig;
use crate::keys::KeyTransform;
use crate::reconcile::ReconciliationMap;
use crate::schema::SchemaRegistry;
use crate::store::RecordStore;
use crate::types::{
    ClientId, NormalizedCollection, NormalizedPayload, PayloadNode, RecordId, RecordKey, Sideloads, TypeDescriptor,
};

pub use base::{BaseSerializer, JsonSerializer};
use embed::Embedder;
use normalize::Flattener;

/// Error type for the embedded transform.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Type is not registered.
    #[error("Unknown type: {0}")]
    UnknownType(String),
    /// Type has no relationship with this key.
    #[error("Unknown relationship {type_name}.{key}")]
    UnknownRelationship {
        /// Record type.
        type_name: String,
        /// Relationship key.
        key: String,
    },
    /// Relationship is not embedded outbound.
    #[error("Relationship {type_name}.{key} is not embedded")]
    NotEmbedded {
        /// Record type.
        type_name: String,
        /// Relationship key.
        key: String,
    },
    /// Payload has no root under the expected key.
    #[error("Payload has no root key {0:?}")]
    MissingRoot(String),
    /// Payload value has the wrong shape.
    #[error("Malformed {type_name} payload at {field:?}: {reason}")]
    MalformedPayload {
        /// Type being read.
        type_name: String,
        /// Wire field.
        field: String,
        /// What was wrong.
        reason: String,
    },
    /// Embedded child has neither an id nor a placeholder.
    #[error("Embedded {type_name} in {relationship:?} has neither an id nor a placeholder")]
    MissingIdentifier {
        /// Child type.
        type_name: String,
        /// Relationship the child was embedded under.
        relationship: String,
    },
    /// Embedding nests deeper than allowed.
    #[error("Embedding depth exceeds {max_depth} at type {type_name}")]
    DepthExceeded {
        /// Type at which the limit was hit.
        type_name: String,
        /// Configured limit.
        max_depth: usize,
    },
    /// Two confirmations in one response claim the same durable id.
    #[error("Response assigns {type_name}:{id} to more than one record")]
    ConflictingIdentity {
        /// Record type.
        type_name: String,
        /// Id claimed twice.
        id: RecordId,
    },
    /// Record not resident in the store.
    #[error("Record not found: {0}")]
    RecordNotFound(RecordKey),
    /// Store error.
    #[error("Store error: {0}")]
    Store(String),
}

impl EmbedError {
    /// Create a store error from any error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Store(e.to_string())
    }

    pub(crate) fn malformed(type_name: &str, field: &str, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            type_name: type_name.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Short name of a JSON value's kind, for error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Embedded-association transform over a base serializer.
///
/// Implementors supply the base codec, schema and config; every operation
/// is a provided method. The reconciliation map is passed per call so each
/// save cycle can own its map.
pub trait EmbeddedEncoding {
    /// Field-level codec.
    type Base: BaseSerializer;

    /// Field-level codec.
    fn base(&self) -> &Self::Base;

    /// Registered types.
    fn schema(&self) -> &SchemaRegistry;

    /// Transform settings.
    fn config(&self) -> &EmbedConfig;

    /// Look up a registered type.
    fn descriptor(&self, type_name: &str) -> Result<&TypeDescriptor, EmbedError> {
        self.schema()
            .get(type_name)
            .ok_or_else(|| EmbedError::UnknownType(type_name.to_string()))
    }

    /// Flatten one raw node in place, collecting embedded children into
    /// `sideloads` and confirming echoed placeholders against `store`.
    ///
    /// Sideloaded nodes stay in wire form; they are neither decoded nor
    /// ingested. Store writes happen only once the whole node has
    /// flattened, and placeholders drain only once every write succeeded.
    fn normalize<S: RecordStore>(
        &self,
        store: &mut S,
        clients: &mut ReconciliationMap,
        type_name: &str,
        node: &mut PayloadNode,
        sideloads: &mut Sideloads,
    ) -> Result<(), EmbedError> {
        let descriptor = self.descriptor(type_name)?;
        let mut pass = Flattener::new(self, clients);
        pass.flatten(descriptor, node, 0)?;
        pass.confirm(store)?;
        for (bucket, records) in pass.into_sideloads() {
            for record in records {
                sideloads.push(&bucket, record);
            }
        }
        Ok(())
    }

    /// Extract a single-root payload.
    ///
    /// The root is returned decoded, not ingested; sideloads are decoded
    /// and ingested into `store`. Every confirmation is checked with
    /// [`RecordStore::check_save`] before the first write, so a rejected
    /// save leaves both the store and `clients` untouched.
    fn extract_one<S: RecordStore>(
        &self,
        store: &mut S,
        clients: &mut ReconciliationMap,
        type_name: &str,
        mut payload: PayloadNode,
    ) -> Result<NormalizedPayload, EmbedError> {
        let descriptor = self.descriptor(type_name)?;
        let root_key = self.base().keys().root_key(type_name);

        let mut root = match payload.remove(&root_key) {
            Some(Value::Object(root)) => root,
            Some(other) => {
                return Err(EmbedError::malformed(
                    type_name,
                    &root_key,
                    format!("expected an object, found {}", value_kind(&other)),
                ))
            }
            None => return Err(EmbedError::MissingRoot(root_key)),
        };

        let mut pass = Flattener::new(self, clients);
        pass.flatten(descriptor, &mut root, 0)?;
        pass.flatten_top_level(&mut payload, &root_key)?;
        let (sideloads, placeholders) = pass.finish(store)?;

        Ok(NormalizedPayload {
            type_name: type_name.to_string(),
            root: self.base().normalize_fields(descriptor, root),
            sideloads,
            placeholders,
        })
    }

    /// Extract a multi-root payload, sharing one sideload accumulator
    /// across all roots.
    fn extract_many<S: RecordStore>(
        &self,
        store: &mut S,
        clients: &mut ReconciliationMap,
        type_name: &str,
        mut payload: PayloadNode,
    ) -> Result<NormalizedCollection, EmbedError> {
        let descriptor = self.descriptor(type_name)?;
        let root_key = self.base().keys().plural_root_key(type_name);

        let raw_roots = match payload.remove(&root_key) {
            Some(Value::Array(roots)) => roots,
            Some(other) => {
                return Err(EmbedError::malformed(
                    type_name,
                    &root_key,
                    format!("expected an array, found {}", value_kind(&other)),
                ))
            }
            None => return Err(EmbedError::MissingRoot(root_key)),
        };

        let mut pass = Flattener::new(self, clients);
        let mut roots = Vec::with_capacity(raw_roots.len());
        for raw in raw_roots {
            let Value::Object(mut root) = raw else {
                return Err(EmbedError::malformed(type_name, &root_key, "expected an array of objects"));
            };
            pass.flatten(descriptor, &mut root, 0)?;
            roots.push(root);
        }
        pass.flatten_top_level(&mut payload, &root_key)?;
        let (sideloads, placeholders) = pass.finish(store)?;

        Ok(NormalizedCollection {
            type_name: type_name.to_string(),
            roots: roots
                .into_iter()
                .map(|root| self.base().normalize_fields(descriptor, root))
                .collect(),
            sideloads,
            placeholders,
        })
    }

    /// Serialize a record for transmission, inlining every `always`
    /// relation recursively.
    ///
    /// Placeholders assigned during a failed call are withdrawn.
    fn serialize_record<S: RecordStore>(
        &self,
        store: &S,
        clients: &mut ReconciliationMap,
        key: RecordKey,
        include_id: bool,
    ) -> Result<PayloadNode, EmbedError> {
        let mut pass = Embedder::new(self, store, clients);
        let result = pass.serialize(key, include_id, 0);
        pass.settle(result)
    }

    /// Inline the children of one `always` relation.
    fn embed_relation<S: RecordStore>(
        &self,
        store: &S,
        clients: &mut ReconciliationMap,
        key: RecordKey,
        relationship: &str,
    ) -> Result<Vec<PayloadNode>, EmbedError> {
        let record = store.record(key).ok_or(EmbedError::RecordNotFound(key))?;
        let descriptor = self.descriptor(&record.type_name)?;
        let rel = descriptor
            .relationship(relationship)
            .ok_or_else(|| EmbedError::UnknownRelationship {
                type_name: descriptor.name.clone(),
                key: relationship.to_string(),
            })?;
        if !rel.is_embedded_outbound() {
            return Err(EmbedError::NotEmbedded {
                type_name: descriptor.name.clone(),
                key: relationship.to_string(),
            });
        }

        let mut pass = Embedder::new(self, store, clients);
        let result = pass.embed(record, rel, 0);
        pass.settle(result)
    }
}

/// Embedded serializer bound to one schema.
///
/// Owns a reconciliation map for callers that keep one map per serializer.
/// Each pass holds the map's lock for its whole duration. Overlapping save
/// cycles on one serializer are still the caller's to prevent; use the
/// [`EmbeddedEncoding`] methods with a map per cycle instead.
#[derive(Debug)]
pub struct EmbeddedSerializer<B = JsonSerializer> {
    schema: SchemaRegistry,
    base: B,
    config: EmbedConfig,
    clients: Mutex<ReconciliationMap>,
}

impl EmbeddedSerializer<JsonSerializer> {
    /// Create a serializer with snake_case wire keys and default config.
    pub fn new(schema: SchemaRegistry) -> Self {
        Self::with_base(schema, JsonSerializer::default(), EmbedConfig::default())
    }
}

impl<B: BaseSerializer> EmbeddedSerializer<B> {
    /// Create a serializer over a custom base codec.
    pub fn with_base(schema: SchemaRegistry, base: B, config: EmbedConfig) -> Self {
        Self {
            schema,
            base,
            config,
            clients: Mutex::new(ReconciliationMap::new()),
        }
    }

    /// Replace the config.
    pub fn with_config(mut self, config: EmbedConfig) -> Self {
        self.config = config;
        self
    }

    /// Serialize a record as `{ <root key>: { ... } }` using the owned map.
    pub fn serialize<S: RecordStore>(&self, store: &S, key: RecordKey) -> Result<PayloadNode, EmbedError> {
        let record = store.record(key).ok_or(EmbedError::RecordNotFound(key))?;
        let root_key = self.base.keys().root_key(&record.type_name);

        let mut clients = self.clients.lock();
        let body = self.serialize_record(store, &mut clients, key, true)?;

        let mut payload = PayloadNode::new();
        payload.insert(root_key, Value::Object(body));
        Ok(payload)
    }

    /// Extract a single-root response using the owned map.
    pub fn extract<S: RecordStore>(&self, store: &mut S, type_name: &str, payload: PayloadNode) -> Result<NormalizedPayload, EmbedError> {
        let mut clients = self.clients.lock();
        let normalized = self.extract_one(store, &mut clients, type_name, payload)?;
        warn_orphans(&clients);
        Ok(normalized)
    }

    /// Extract a multi-root response using the owned map.
    pub fn extract_collection<S: RecordStore>(
        &self,
        store: &mut S,
        type_name: &str,
        payload: PayloadNode,
    ) -> Result<NormalizedCollection, EmbedError> {
        let mut clients = self.clients.lock();
        let normalized = self.extract_many(store, &mut clients, type_name, payload)?;
        warn_orphans(&clients);
        Ok(normalized)
    }

    /// Extract a single-root payload and ingest the root too.
    pub fn push_payload<S: RecordStore>(&self, store: &mut S, type_name: &str, payload: PayloadNode) -> Result<RecordKey, EmbedError> {
        let normalized = self.extract(store, type_name, payload)?;
        let descriptor = self.descriptor(type_name)?;
        store
            .ingest(descriptor, normalized.root, &normalized.placeholders)
            .map_err(EmbedError::from_store)
    }

    /// Placeholders still awaiting confirmation.
    pub fn pending_placeholders(&self) -> Vec<(ClientId, RecordKey)> {
        self.clients
            .lock()
            .orphaned()
            .map(|(client_id, key)| (client_id.clone(), key))
            .collect()
    }

    /// Run `f` with exclusive access to the owned map.
    pub fn with_clients<R>(&self, f: impl FnOnce(&mut ReconciliationMap) -> R) -> R {
        f(&mut *self.clients.lock())
    }
}

impl<B: BaseSerializer> EmbeddedEncoding for EmbeddedSerializer<B> {
    type Base = B;

    fn base(&self) -> &B {
        &self.base
    }

    fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    fn config(&self) -> &EmbedConfig {
        &self.config
    }
}

fn warn_orphans(clients: &ReconciliationMap) {
    if !clients.is_empty() {
        tracing::warn!(
            live = clients.len(),
            "placeholders still unconfirmed after extracting a response"
        );
    }
}
