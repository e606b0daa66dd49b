//! # embedded-records
//!
//! Converts between nested API payloads and a normalized record store for
//! types with embedded one-to-many associations.
//!
//! The crate answers two questions:
//!
//! > Given a nested response, which flat records does it contain, and which
//! > of them are records we already hold?
//!
//! > Given a record graph, what nested payload do we send, and how do we
//! > recognize unsaved children when the server echoes them back?
//!
//! ## Core Contract
//!
//! 1. Inbound, every embedded relation is rewritten to an ordered id list and
//!    its children are sideloaded by type, depth-first
//! 2. Outbound, every `always` relation is inlined; children without an id
//!    carry a placeholder recorded in a [`ReconciliationMap`]
//! 3. A response echoing a live placeholder confirms the resident record
//!    instead of creating a duplicate, and drains the placeholder
//!
//! ## Architecture
//!
//! ```text
//!   RecordStore ──serialize_record──▶ nested payload ──▶ (transport)
//!        ▲              │                                    │
//!        │     ReconciliationMap ◀───────────────┐           ▼
//!        │                                       └── extract_one / extract_many
//!        └───── ingest / did_save ◀──────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Id order in a rewritten relation matches child order in the payload
//! - Sideloads are bucketed by type, apart from the root
//! - After a full round trip of every placeholder child, the map is empty

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod config;
pub mod keys;
pub mod reconcile;
pub mod schema;
pub mod serializer;
pub mod store;
pub mod types;

// Re-exports
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use config::{ConfigError, EmbedConfig, DEFAULT_CLIENT_ID_KEY, DEFAULT_MAX_DEPTH};
pub use keys::{KeyTransform, UnderscoreKeys};
pub use reconcile::{PlaceholderKeys, ReconciliationMap};
pub use schema::{SchemaError, SchemaRegistry};
pub use serializer::{BaseSerializer, EmbedError, EmbeddedEncoding, EmbeddedSerializer, JsonSerializer};
pub use store::{InMemoryRecordStore, MemoryStoreError, RecordStore};
pub use types::{
    ClientId, EmbedPolicy, NormalizedCollection, NormalizedPayload, PayloadNode, Record, RecordId, RecordKey,
    Relationship, RelationshipKind, Sideloads, TypeDescriptor,
};

/// Internal (and default wire) name of the primary key field.
pub const PRIMARY_KEY: &str = "id";
