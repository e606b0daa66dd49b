//! Core types for the embedded-records transform.

pub mod descriptor;
pub mod payload;
pub mod record;

pub use descriptor::{EmbedPolicy, Relationship, RelationshipKind, TypeDescriptor};
pub use payload::{NormalizedCollection, NormalizedPayload, PayloadNode, Sideloads};
pub use record::{ClientId, Record, RecordId, RecordKey};
