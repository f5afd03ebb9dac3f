use serde::{Deserialize, Serialize};
use trackable_types::RelationshipKind;

/// Describes one entity type's relationship properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub entity_type: String,
    #[serde(default)]
    pub relations: Vec<Relation>,
    /// Whether entities of this type carry an `EntityIdentifier` and can be
    /// correlated during a merge.
    #[serde(default = "default_equatable")]
    pub equatable: bool,
}

fn default_equatable() -> bool {
    true
}

impl EntitySchema {
    /// Creates an equatable schema with no relationships.
    pub fn new(entity_type: &str) -> Self {
        Self {
            entity_type: entity_type.into(),
            relations: Vec::new(),
            equatable: true,
        }
    }

    /// Adds a relationship property.
    #[must_use]
    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Marks the type as lacking a usable identity.
    #[must_use]
    pub fn not_equatable(mut self) -> Self {
        self.equatable = false;
        self
    }

    /// Looks up a relationship property by name.
    pub fn relation(&self, property: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.property == property)
    }

    /// Reference (1-1 and M-1) properties, in declaration order.
    pub fn references(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter().filter(|r| r.kind.is_reference())
    }

    /// Collection (1-M and M-M) properties, in declaration order.
    pub fn collections(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter().filter(|r| r.kind.is_collection())
    }
}

/// A relationship property on an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Property name on the owning entity (e.g. "order_details").
    pub property: String,
    pub kind: RelationshipKind,
    /// Entity type on the other end.
    pub related_type: String,
}

impl Relation {
    fn new(property: &str, kind: RelationshipKind, related_type: &str) -> Self {
        Self {
            property: property.into(),
            kind,
            related_type: related_type.into(),
        }
    }

    /// Shorthand for an owned single dependent (customer → setting).
    pub fn one_to_one(property: &str, related_type: &str) -> Self {
        Self::new(property, RelationshipKind::OneToOne, related_type)
    }

    /// Shorthand for an owned child collection (order → details).
    pub fn one_to_many(property: &str, related_type: &str) -> Self {
        Self::new(property, RelationshipKind::OneToMany, related_type)
    }

    /// Shorthand for a reference to a shared principal (detail → product).
    pub fn many_to_one(property: &str, related_type: &str) -> Self {
        Self::new(property, RelationshipKind::ManyToOne, related_type)
    }

    /// Shorthand for a linked collection (employee ↔ territories).
    pub fn many_to_many(property: &str, related_type: &str) -> Self {
        Self::new(property, RelationshipKind::ManyToMany, related_type)
    }
}
