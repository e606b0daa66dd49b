//! Placeholder reconciliation.
//!
//! When an unpersisted record is embedded outbound it is tagged with a
//! placeholder id. The server echoes that placeholder next to the id it
//! assigned, and the flattening pass uses this map to find the resident
//! record instead of creating a duplicate.
//!
//! ```text
//! Unpersisted ──embed──▶ Embedded(placeholder) ──normalize──▶ Confirmed
//!                                   │
//!                                   └── never echoed ──▶ Orphaned (entry stays)
//! ```

use std::collections::BTreeMap;

use serde_json::Value;

use crate::types::{ClientId, RecordKey};

/// Live placeholder ids and the records they stand for.
///
/// Written by the embedding pass, drained by the flattening pass. Entries
/// for children that never come back stay until [`discard`](Self::discard)
/// or [`clear`](Self::clear) is called.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationMap {
    by_client_id: BTreeMap<ClientId, RecordKey>,
    by_record: BTreeMap<RecordKey, ClientId>,
}

impl ReconciliationMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholder for an unpersisted record.
    ///
    /// Returns the live placeholder if the record already has one, so a
    /// record embedded twice before confirmation keeps a single entry.
    pub fn placeholder_for(&mut self, record: RecordKey) -> ClientId {
        if let Some(existing) = self.by_record.get(&record) {
            return existing.clone();
        }

        let client_id = ClientId::generate();

        tracing::trace!(client_id = %client_id, record = %record, "assigned placeholder");
        self.by_client_id.insert(client_id.clone(), record);
        self.by_record.insert(record, client_id.clone());
        client_id
    }

    /// Record a placeholder stands for, if live.
    pub fn get(&self, client_id: &ClientId) -> Option<RecordKey> {
        self.by_client_id.get(client_id).copied()
    }

    /// Whether a placeholder is live.
    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.by_client_id.contains_key(client_id)
    }

    /// Live placeholder of a record, if any.
    pub fn client_id_of(&self, record: RecordKey) -> Option<&ClientId> {
        self.by_record.get(&record)
    }

    /// Confirm a placeholder: remove and return its record.
    pub fn confirm(&mut self, client_id: &ClientId) -> Option<RecordKey> {
        let record = self.by_client_id.remove(client_id)?;
        self.by_record.remove(&record);
        Some(record)
    }

    /// Drop the entry of a record that will never be confirmed.
    pub fn discard(&mut self, record: RecordKey) -> Option<ClientId> {
        let client_id = self.by_record.remove(&record)?;
        self.by_client_id.remove(&client_id);
        Some(client_id)
    }

    /// Live (unconfirmed) entries, in placeholder order.
    pub fn orphaned(&self) -> impl Iterator<Item = (&ClientId, RecordKey)> {
        self.by_client_id.iter().map(|(c, r)| (c, *r))
    }

    /// Drop every live entry.
    pub fn clear(&mut self) {
        self.by_client_id.clear();
        self.by_record.clear();
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.by_client_id.len()
    }

    /// Whether no placeholders are live.
    pub fn is_empty(&self) -> bool {
        self.by_client_id.is_empty()
    }
}

/// Store keys for records a response references only by a placeholder
/// that is not live.
///
/// Such a child is a new record. Within one pass, id lists that carry its
/// placeholder resolve to the key reserved here, never to a record that
/// happens to hold the same string as a durable id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceholderKeys {
    keys: BTreeMap<(String, ClientId), RecordKey>,
}

impl PlaceholderKeys {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Key reserved for a placeholder of `type_name`, reserving one if needed.
    pub fn key_for(&mut self, type_name: &str, client_id: &ClientId) -> RecordKey {
        *self
            .keys
            .entry((type_name.to_string(), client_id.clone()))
            .or_insert_with(RecordKey::generate)
    }

    /// Resolve an id-list entry referencing a `type_name` record.
    pub fn resolve(&self, type_name: &str, value: &Value) -> Option<RecordKey> {
        let client_id = ClientId::from_value(value)?;
        self.keys.get(&(type_name.to_string(), client_id)).copied()
    }

    /// Reserved entries as (type name, key).
    pub fn iter(&self) -> impl Iterator<Item = (&str, RecordKey)> {
        self.keys.iter().map(|((type_name, _), key)| (type_name.as_str(), *key))
    }

    /// Number of reserved keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether nothing was reserved.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn key(n: u128) -> RecordKey {
        RecordKey::new(Uuid::from_u128(n))
    }

    #[test]
    fn test_placeholders_are_unique() {
        let mut map = ReconciliationMap::new();
        let a = map.placeholder_for(key(1));
        let b = map.placeholder_for(key(2));
        assert_ne!(a, b);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_placeholder_reused_while_live() {
        let mut map = ReconciliationMap::new();
        let first = map.placeholder_for(key(1));
        let second = map.placeholder_for(key(1));
        assert_eq!(first, second);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_confirm_drains_entry() {
        let mut map = ReconciliationMap::new();
        let client_id = map.placeholder_for(key(1));

        assert_eq!(map.confirm(&client_id), Some(key(1)));
        assert!(map.is_empty());
        assert!(map.client_id_of(key(1)).is_none());
        assert_eq!(map.confirm(&client_id), None);
    }

    #[test]
    fn test_confirmed_token_not_reissued() {
        let mut map = ReconciliationMap::new();
        let first = map.placeholder_for(key(1));
        map.confirm(&first);
        let second = map.placeholder_for(key(2));
        assert_ne!(first, second);
    }

    #[test]
    fn test_placeholders_do_not_look_like_server_ids() {
        let mut map = ReconciliationMap::new();
        let client_id = map.placeholder_for(key(1));
        assert!(Uuid::parse_str(client_id.as_str()).is_ok());
        assert!(client_id.as_str().parse::<u64>().is_err());
    }

    #[test]
    fn test_placeholder_keys_are_scoped_by_type() {
        let mut keys = PlaceholderKeys::new();
        let token = ClientId::new("1");
        let villain = keys.key_for("superVillain", &token);

        assert_eq!(keys.key_for("superVillain", &token), villain);
        assert_eq!(keys.resolve("superVillain", &json!("1")), Some(villain));
        assert_eq!(keys.resolve("evilMinion", &json!("1")), None);
        assert_eq!(keys.resolve("superVillain", &json!("2")), None);
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_orphans_stay_until_discarded() {
        let mut map = ReconciliationMap::new();
        let client_id = map.placeholder_for(key(7));

        let orphans: Vec<_> = map.orphaned().collect();
        assert_eq!(orphans, vec![(&client_id, key(7))]);

        assert_eq!(map.discard(key(7)), Some(client_id));
        assert!(map.is_empty());
    }
}
