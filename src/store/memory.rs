//! In-memory record store.

use std::collections::BTreeMap;

use serde_json::Value;

use super::RecordStore;
use crate::reconcile::PlaceholderKeys;
use crate::types::{PayloadNode, Record, RecordId, RecordKey, TypeDescriptor};
use crate::PRIMARY_KEY;

/// Error type for in-memory store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryStoreError {
    /// Record not found.
    #[error("Record not found: {0}")]
    RecordNotFound(RecordKey),
    /// Saved data carried no id.
    #[error("Saved {type_name} record has no id")]
    MissingId {
        /// Type of the saved record.
        type_name: String,
    },
    /// Another resident record already owns the id.
    #[error("Identity {type_name}:{id} already belongs to another record")]
    DuplicateIdentity {
        /// Record type.
        type_name: String,
        /// Conflicting id.
        id: RecordId,
    },
    /// Record exists but has a different type.
    #[error("Record {key} is a {actual}, not a {expected}")]
    TypeMismatch {
        /// Record key.
        key: RecordKey,
        /// Type the caller assumed.
        expected: String,
        /// Type of the resident record.
        actual: String,
    },
}

/// In-memory record store with an identity map.
///
/// Uses BTreeMap for deterministic iteration order. References to ids that
/// have not been loaded yet create empty stub records, filled in when the
/// record itself is ingested.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    /// Records by key.
    records: BTreeMap<RecordKey, Record>,
    /// (type, id) -> key.
    identity: BTreeMap<(String, RecordId), RecordKey>,
}

impl InMemoryRecordStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unpersisted record with the given attributes.
    pub fn create_record(&mut self, type_name: &str, attributes: PayloadNode) -> RecordKey {
        let key = RecordKey::generate();
        let mut record = Record::new(key, type_name);
        record.attributes = attributes;
        self.records.insert(key, record);
        key
    }

    /// Create a record that already has a durable id.
    pub fn create_persisted(&mut self, type_name: &str, id: RecordId, attributes: PayloadNode) -> RecordKey {
        let key = self.record_for_id(type_name, &id);
        if let Some(record) = self.records.get_mut(&key) {
            record.attributes.extend(attributes);
        }
        key
    }

    /// Append a child to a parent's has-many relationship.
    pub fn add_related(&mut self, parent: RecordKey, relationship: &str, child: RecordKey) -> Result<(), MemoryStoreError> {
        if !self.records.contains_key(&child) {
            return Err(MemoryStoreError::RecordNotFound(child));
        }
        let record = self
            .records
            .get_mut(&parent)
            .ok_or(MemoryStoreError::RecordNotFound(parent))?;
        record.has_many.entry(relationship.to_string()).or_default().push(child);
        Ok(())
    }

    /// Remove a child from a parent's has-many relationship.
    pub fn remove_related(&mut self, parent: RecordKey, relationship: &str, child: RecordKey) -> Result<(), MemoryStoreError> {
        let record = self
            .records
            .get_mut(&parent)
            .ok_or(MemoryStoreError::RecordNotFound(parent))?;
        if let Some(children) = record.has_many.get_mut(relationship) {
            children.retain(|k| *k != child);
        }
        Ok(())
    }

    /// Find a record by type and id.
    pub fn find(&self, type_name: &str, id: &RecordId) -> Option<&Record> {
        self.identity
            .get(&(type_name.to_string(), id.clone()))
            .and_then(|key| self.records.get(key))
    }

    /// All records of a type, in key order.
    pub fn all_of_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a Record> + 'a {
        self.records.values().filter(move |r| r.type_name == type_name)
    }

    /// Get number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record_for_id(&mut self, type_name: &str, id: &RecordId) -> RecordKey {
        let identity = (type_name.to_string(), id.clone());
        if let Some(key) = self.identity.get(&identity) {
            return *key;
        }

        let key = RecordKey::generate();
        let mut record = Record::new(key, type_name);
        record.id = Some(id.clone());
        self.records.insert(key, record);
        self.identity.insert(identity, key);
        key
    }

    fn apply(
        &mut self,
        descriptor: &TypeDescriptor,
        key: RecordKey,
        data: PayloadNode,
        placeholders: &PlaceholderKeys,
    ) -> Result<(), MemoryStoreError> {
        let mut attributes = PayloadNode::new();
        let mut has_many = BTreeMap::new();

        for (field, value) in data {
            if field == PRIMARY_KEY {
                continue;
            }
            match (descriptor.relationship(&field), value) {
                (Some(rel), Value::Array(ids)) if rel.kind.is_many() => {
                    let keys: Vec<_> = ids
                        .iter()
                        .filter_map(|value| {
                            placeholders.resolve(&rel.target_type, value).or_else(|| {
                                RecordId::from_value(value).map(|id| self.record_for_id(&rel.target_type, &id))
                            })
                        })
                        .collect();
                    has_many.insert(field, keys);
                }
                (_, value) => {
                    attributes.insert(field, value);
                }
            }
        }

        let record = self
            .records
            .get_mut(&key)
            .ok_or(MemoryStoreError::RecordNotFound(key))?;
        record.attributes.extend(attributes);
        record.has_many.extend(has_many);
        Ok(())
    }

    /// Id a save would assign, after checking nothing else owns it.
    fn saved_id(&self, descriptor: &TypeDescriptor, key: RecordKey, data: &PayloadNode) -> Result<RecordId, MemoryStoreError> {
        let id = data
            .get(PRIMARY_KEY)
            .and_then(RecordId::from_value)
            .ok_or_else(|| MemoryStoreError::MissingId { type_name: descriptor.name.clone() })?;

        let record = self.records.get(&key).ok_or(MemoryStoreError::RecordNotFound(key))?;
        if record.type_name != descriptor.name {
            return Err(MemoryStoreError::TypeMismatch {
                key,
                expected: descriptor.name.clone(),
                actual: record.type_name.clone(),
            });
        }

        match self.identity.get(&(descriptor.name.clone(), id.clone())) {
            Some(owner) if *owner != key => Err(MemoryStoreError::DuplicateIdentity {
                type_name: descriptor.name.clone(),
                id,
            }),
            _ => Ok(id),
        }
    }
}

impl RecordStore for InMemoryRecordStore {
    type Error = MemoryStoreError;

    fn record(&self, key: RecordKey) -> Option<&Record> {
        self.records.get(&key)
    }

    fn ingest(
        &mut self,
        descriptor: &TypeDescriptor,
        data: PayloadNode,
        placeholders: &PlaceholderKeys,
    ) -> Result<RecordKey, Self::Error> {
        let key = match data.get(PRIMARY_KEY).and_then(RecordId::from_value) {
            Some(id) => self.record_for_id(&descriptor.name, &id),
            None => {
                let key = RecordKey::generate();
                self.records.insert(key, Record::new(key, descriptor.name.clone()));
                key
            }
        };
        self.apply(descriptor, key, data, placeholders)?;
        Ok(key)
    }

    fn ingest_at(
        &mut self,
        descriptor: &TypeDescriptor,
        key: RecordKey,
        data: PayloadNode,
        placeholders: &PlaceholderKeys,
    ) -> Result<(), Self::Error> {
        match self.records.get(&key) {
            Some(record) if record.type_name != descriptor.name => {
                return Err(MemoryStoreError::TypeMismatch {
                    key,
                    expected: descriptor.name.clone(),
                    actual: record.type_name.clone(),
                });
            }
            Some(_) => {}
            None => {
                self.records.insert(key, Record::new(key, descriptor.name.clone()));
            }
        }
        self.apply(descriptor, key, data, placeholders)
    }

    fn check_save(&self, descriptor: &TypeDescriptor, key: RecordKey, data: &PayloadNode) -> Result<(), Self::Error> {
        self.saved_id(descriptor, key, data).map(|_| ())
    }

    fn did_save(
        &mut self,
        descriptor: &TypeDescriptor,
        key: RecordKey,
        data: PayloadNode,
        placeholders: &PlaceholderKeys,
    ) -> Result<(), Self::Error> {
        let id = self.saved_id(descriptor, key, &data)?;
        self.identity.insert((descriptor.name.clone(), id.clone()), key);
        if let Some(record) = self.records.get_mut(&key) {
            record.id = Some(id);
        }
        self.apply(descriptor, key, data, placeholders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClientId, EmbedPolicy};
    use serde_json::json;

    fn node(value: Value) -> PayloadNode {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn planet() -> TypeDescriptor {
        TypeDescriptor::new("homePlanet")
            .attribute("name")
            .has_many("villains", "superVillain", EmbedPolicy::Always)
    }

    fn villain() -> TypeDescriptor {
        TypeDescriptor::new("superVillain").attribute("firstName")
    }

    fn none() -> PlaceholderKeys {
        PlaceholderKeys::new()
    }

    #[test]
    fn test_ingest_resolves_references() {
        let mut store = InMemoryRecordStore::new();
        let villain_key = store.ingest(&villain(), node(json!({ "id": "1", "firstName": "Tom" })), &none()).unwrap();
        let planet_key = store
            .ingest(&planet(), node(json!({ "id": "1", "name": "Umber", "villains": ["1"] })), &none())
            .unwrap();

        let planet = store.record(planet_key).unwrap();
        assert_eq!(planet.related("villains"), &[villain_key]);
        assert_eq!(planet.attribute("name"), Some(&json!("Umber")));
        assert!(planet.attribute("villains").is_none());
    }

    #[test]
    fn test_ingest_merges_by_identity() {
        let mut store = InMemoryRecordStore::new();
        let first = store.ingest(&villain(), node(json!({ "id": "1", "firstName": "Tom" })), &none()).unwrap();
        let second = store.ingest(&villain(), node(json!({ "id": 1, "lastName": "Dale" })), &none()).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        let record = store.record(first).unwrap();
        assert_eq!(record.attribute("firstName"), Some(&json!("Tom")));
        assert_eq!(record.attribute("lastName"), Some(&json!("Dale")));
    }

    #[test]
    fn test_unknown_reference_creates_stub() {
        let mut store = InMemoryRecordStore::new();
        store
            .ingest(&planet(), node(json!({ "id": "1", "villains": ["9"] })), &none())
            .unwrap();

        let stub = store.find("superVillain", &RecordId::from("9")).unwrap();
        assert!(stub.attributes.is_empty());
    }

    #[test]
    fn test_did_save_assigns_identity() {
        let mut store = InMemoryRecordStore::new();
        let key = store.create_record("superVillain", node(json!({ "firstName": "Tom" })));

        store.did_save(&villain(), key, node(json!({ "id": "5", "firstName": "Tom" })), &none()).unwrap();

        let record = store.record(key).unwrap();
        assert_eq!(record.id, Some(RecordId::from("5")));
        assert_eq!(store.find("superVillain", &RecordId::from("5")).map(|r| r.key), Some(key));
    }

    #[test]
    fn test_did_save_requires_id() {
        let mut store = InMemoryRecordStore::new();
        let key = store.create_record("superVillain", PayloadNode::new());
        let err = store.did_save(&villain(), key, node(json!({ "firstName": "Tom" })), &none()).unwrap_err();
        assert!(matches!(err, MemoryStoreError::MissingId { .. }));
    }

    #[test]
    fn test_did_save_rejects_taken_identity() {
        let mut store = InMemoryRecordStore::new();
        store.create_persisted("superVillain", RecordId::from("5"), PayloadNode::new());
        let key = store.create_record("superVillain", PayloadNode::new());

        let data = node(json!({ "id": "5" }));
        let checked = store.check_save(&villain(), key, &data).unwrap_err();
        assert!(matches!(checked, MemoryStoreError::DuplicateIdentity { .. }));

        let err = store.did_save(&villain(), key, data, &none()).unwrap_err();
        assert_eq!(err, checked);
        assert!(store.record(key).unwrap().id.is_none());
    }

    #[test]
    fn test_placeholder_reference_never_read_as_durable_id() {
        let mut store = InMemoryRecordStore::new();
        let tom = store.ingest(&villain(), node(json!({ "id": "1", "firstName": "Tom" })), &none()).unwrap();

        let mut placeholders = PlaceholderKeys::new();
        let fresh = placeholders.key_for("superVillain", &ClientId::new("1"));
        store
            .ingest_at(&villain(), fresh, node(json!({ "firstName": "Nobody" })), &placeholders)
            .unwrap();
        let planet = store
            .ingest(&planet(), node(json!({ "id": "9", "villains": ["1"] })), &placeholders)
            .unwrap();

        assert_eq!(store.record(planet).unwrap().related("villains"), &[fresh]);
        assert_ne!(fresh, tom);
        assert_eq!(store.record(fresh).unwrap().attribute("firstName"), Some(&json!("Nobody")));
        assert!(store.record(fresh).unwrap().id.is_none());
    }

    #[test]
    fn test_add_and_remove_related() {
        let mut store = InMemoryRecordStore::new();
        let parent = store.create_record("homePlanet", PayloadNode::new());
        let a = store.create_record("superVillain", PayloadNode::new());
        let b = store.create_record("superVillain", PayloadNode::new());

        store.add_related(parent, "villains", a).unwrap();
        store.add_related(parent, "villains", b).unwrap();
        store.remove_related(parent, "villains", a).unwrap();

        assert_eq!(store.record(parent).unwrap().related("villains"), &[b]);
    }
}
