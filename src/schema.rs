//! Registry of type descriptors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::types::{RelationshipKind, TypeDescriptor};

/// Error type for schema registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Only has-many relationships can be embedded.
    #[error("Embedded belongsTo is not supported: {type_name}.{key}")]
    EmbeddedBelongsTo {
        /// Declaring type.
        type_name: String,
        /// Relationship key.
        key: String,
    },
    /// A relationship targets a type that was never registered.
    #[error("Relationship {type_name}.{key} targets unregistered type {target_type}")]
    UnknownTarget {
        /// Declaring type.
        type_name: String,
        /// Relationship key.
        key: String,
        /// Missing target type.
        target_type: String,
    },
}

/// Type descriptors by name.
///
/// The registry carries a fingerprint that changes whenever a descriptor is
/// added or replaced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<TypeDescriptor>", into = "Vec<TypeDescriptor>")]
pub struct SchemaRegistry {
    types: BTreeMap<String, TypeDescriptor>,
    fingerprint: String,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.update_fingerprint();
        registry
    }

    /// Register (or replace) a descriptor.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<(), SchemaError> {
        if let Some(rel) = descriptor
            .relationships
            .iter()
            .find(|r| r.kind == RelationshipKind::BelongsTo && r.embed.embeds_inbound())
        {
            return Err(SchemaError::EmbeddedBelongsTo {
                type_name: descriptor.name.clone(),
                key: rel.key.clone(),
            });
        }

        self.types.insert(descriptor.name.clone(), descriptor);
        self.update_fingerprint();
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, descriptor: TypeDescriptor) -> Result<Self, SchemaError> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Look up a descriptor by type name.
    pub fn get(&self, type_name: &str) -> Option<&TypeDescriptor> {
        self.types.get(type_name)
    }

    /// Check every relationship target is registered.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for descriptor in self.types.values() {
            for rel in &descriptor.relationships {
                if !self.types.contains_key(&rel.target_type) {
                    return Err(SchemaError::UnknownTarget {
                        type_name: descriptor.name.clone(),
                        key: rel.key.clone(),
                        target_type: rel.target_type.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Registered descriptors, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    /// Get the registry fingerprint.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Get the number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn update_fingerprint(&mut self) {
        let descriptors: Vec<_> = self.types.values().collect();
        // Descriptors are plain strings and enums; serialization cannot fail.
        self.fingerprint = canonical_hash_hex(&descriptors).unwrap_or_default();
    }
}

impl TryFrom<Vec<TypeDescriptor>> for SchemaRegistry {
    type Error = SchemaError;

    fn try_from(descriptors: Vec<TypeDescriptor>) -> Result<Self, Self::Error> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }
}

impl From<SchemaRegistry> for Vec<TypeDescriptor> {
    fn from(registry: SchemaRegistry) -> Self {
        registry.types.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EmbedPolicy;

    fn planets() -> SchemaRegistry {
        SchemaRegistry::new()
            .with(TypeDescriptor::new("homePlanet").attribute("name").has_many("villains", "superVillain", EmbedPolicy::Always))
            .unwrap()
            .with(TypeDescriptor::new("superVillain").attribute("firstName").attribute("lastName"))
            .unwrap()
    }

    #[test]
    fn test_lookup() {
        let registry = planets();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("homePlanet").is_some());
        assert!(registry.get("evilMinion").is_none());
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_rejects_embedded_belongs_to() {
        let mut rel_owner = TypeDescriptor::new("superVillain").belongs_to("homePlanet", "homePlanet");
        rel_owner.relationships[0].embed = EmbedPolicy::Always;

        let err = SchemaRegistry::new().register(rel_owner).unwrap_err();
        assert!(matches!(err, SchemaError::EmbeddedBelongsTo { .. }));
    }

    #[test]
    fn test_validate_reports_unknown_target() {
        let registry = SchemaRegistry::new()
            .with(TypeDescriptor::new("homePlanet").has_many("villains", "superVillain", EmbedPolicy::Always))
            .unwrap();

        match registry.validate() {
            Err(SchemaError::UnknownTarget { target_type, .. }) => assert_eq!(target_type, "superVillain"),
            other => panic!("expected UnknownTarget, got {other:?}"),
        }
    }

    #[test]
    fn test_fingerprint_changes_on_register() {
        let mut registry = planets();
        let before = registry.fingerprint().to_string();
        registry.register(TypeDescriptor::new("evilMinion")).unwrap();
        assert_ne!(before, registry.fingerprint());
    }

    #[test]
    fn test_serde_round_trip_keeps_fingerprint() {
        let registry = planets();
        let json = serde_json::to_string(&registry).unwrap();
        let restored: SchemaRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(registry.fingerprint(), restored.fingerprint());
    }
}
