//! Type descriptors: the schema the transform is driven by.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipKind {
    /// One-to-many. The only kind that can be embedded.
    HasMany,
    /// Many-to-one.
    BelongsTo,
}

impl RelationshipKind {
    /// Whether the relationship holds a sequence of references.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::HasMany)
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HasMany => write!(f, "hasMany"),
            Self::BelongsTo => write!(f, "belongsTo"),
        }
    }
}

/// Whether related records travel inline or by reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedPolicy {
    /// References only, in both directions.
    #[default]
    None,
    /// Embedded inbound and outbound.
    Always,
    /// Embedded inbound only; serialized as references outbound.
    Load,
}

impl EmbedPolicy {
    /// Parse a policy from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" | "" => Some(Self::None),
            "always" => Some(Self::Always),
            "load" => Some(Self::Load),
            _ => None,
        }
    }

    /// Whether inbound payloads carry this relation nested.
    pub fn embeds_inbound(&self) -> bool {
        matches!(self, Self::Always | Self::Load)
    }

    /// Whether outbound payloads inline this relation.
    pub fn embeds_outbound(&self) -> bool {
        matches!(self, Self::Always)
    }
}

impl fmt::Display for EmbedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Always => write!(f, "always"),
            Self::Load => write!(f, "load"),
        }
    }
}

/// A relationship declared on a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Internal relationship key (camelCase).
    pub key: String,
    /// Cardinality.
    pub kind: RelationshipKind,
    /// Name of the related type.
    pub target_type: String,
    /// Embedding policy.
    #[serde(default)]
    pub embed: EmbedPolicy,
}

impl Relationship {
    /// Create a has-many relationship.
    pub fn has_many(key: impl Into<String>, target_type: impl Into<String>, embed: EmbedPolicy) -> Self {
        Self {
            key: key.into(),
            kind: RelationshipKind::HasMany,
            target_type: target_type.into(),
            embed,
        }
    }

    /// Create a belongs-to relationship.
    pub fn belongs_to(key: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: RelationshipKind::BelongsTo,
            target_type: target_type.into(),
            embed: EmbedPolicy::None,
        }
    }

    /// Embedded has-many, read from inbound payloads.
    pub fn is_embedded_inbound(&self) -> bool {
        self.kind.is_many() && self.embed.embeds_inbound()
    }

    /// Embedded has-many, written to outbound payloads.
    pub fn is_embedded_outbound(&self) -> bool {
        self.kind.is_many() && self.embed.embeds_outbound()
    }
}

/// Schema of one record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptor {
    /// Type name (camelCase, singular).
    pub name: String,
    /// Attribute keys (camelCase).
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Relationships, in declaration order.
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl TypeDescriptor {
    /// Create a descriptor with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Add an attribute.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }

    /// Add a has-many relationship.
    pub fn has_many(mut self, key: impl Into<String>, target_type: impl Into<String>, embed: EmbedPolicy) -> Self {
        self.relationships.push(Relationship::has_many(key, target_type, embed));
        self
    }

    /// Add a belongs-to relationship.
    pub fn belongs_to(mut self, key: impl Into<String>, target_type: impl Into<String>) -> Self {
        self.relationships.push(Relationship::belongs_to(key, target_type));
        self
    }

    /// Look up a relationship by key.
    pub fn relationship(&self, key: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.key == key)
    }

    /// Relationships embedded in inbound payloads.
    pub fn embedded_inbound(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(|r| r.is_embedded_inbound())
    }

    /// Relationships inlined in outbound payloads.
    pub fn embedded_outbound(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(|r| r.is_embedded_outbound())
    }
}
