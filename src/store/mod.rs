//! Record store backends.
//!
//! The transform never owns records. It reads the graph through
//! [`RecordStore::record`], hands normalized data over with
//! [`RecordStore::ingest`], and confirms saved placeholder records with
//! [`RecordStore::did_save`]. Every save is checked with
//! [`RecordStore::check_save`] before the first write of a pass.

pub mod memory;

use crate::reconcile::PlaceholderKeys;
use crate::types::{PayloadNode, Record, RecordKey, TypeDescriptor};

/// Trait for record store backends.
///
/// Data handed to the store is decoded (internal keys) and flat: has-many
/// relationships arrive as arrays of ids. An entry that `placeholders`
/// resolves names a record of the same pass and must not be read as a
/// durable id.
pub trait RecordStore {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync;

    /// Fetch a resident record.
    fn record(&self, key: RecordKey) -> Option<&Record>;

    /// Push one flat record, merging into the resident record with the same
    /// type and id if there is one.
    fn ingest(
        &mut self,
        descriptor: &TypeDescriptor,
        data: PayloadNode,
        placeholders: &PlaceholderKeys,
    ) -> Result<RecordKey, Self::Error>;

    /// Push one flat record without an id under a key reserved in
    /// `placeholders`, creating the record if it is not resident yet.
    fn ingest_at(
        &mut self,
        descriptor: &TypeDescriptor,
        key: RecordKey,
        data: PayloadNode,
        placeholders: &PlaceholderKeys,
    ) -> Result<(), Self::Error>;

    /// Check that [`did_save`](Self::did_save) would accept `data`, without
    /// writing anything.
    fn check_save(&self, descriptor: &TypeDescriptor, key: RecordKey, data: &PayloadNode) -> Result<(), Self::Error>;

    /// Apply server data to a resident record that was saved without an id.
    ///
    /// `data` carries the id the server assigned.
    fn did_save(
        &mut self,
        descriptor: &TypeDescriptor,
        key: RecordKey,
        data: PayloadNode,
        placeholders: &PlaceholderKeys,
    ) -> Result<(), Self::Error>;
}

pub use memory::{InMemoryRecordStore, MemoryStoreError};
