//! Canonical serialization for deterministic fingerprints.
//!
//! Struct fields serialize in declaration order and `Vec`s in index order, so
//! the same schema always yields the same bytes. Maps in hashed data must be
//! `BTreeMap`s.

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// Compute the canonical xxh64 of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<u64, serde_json::Error> {
    let bytes = to_canonical_bytes(value)?;
    Ok(xxh64(&bytes, 0))
}

/// Compute the canonical hash as a 16-digit hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(format!("{:016x}", canonical_hash(value)?))
}
