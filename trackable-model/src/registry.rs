use crate::EntitySchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while validating a set of schemas.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A relation points at a type nobody registered.
    #[error("{entity_type}.{property} refers to unregistered type {related_type}")]
    UnknownRelatedType {
        entity_type: String,
        property: String,
        related_type: String,
    },

    /// The same property name is declared twice on one type.
    #[error("{entity_type} declares property {property} more than once")]
    DuplicateProperty {
        entity_type: String,
        property: String,
    },

    /// Registry JSON could not be parsed.
    #[error("invalid schema document: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// All entity types known to a graph, keyed by type name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, EntitySchema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a schema.
    pub fn register(&mut self, schema: EntitySchema) -> &mut Self {
        self.schemas.insert(schema.entity_type.clone(), schema);
        self
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, schema: EntitySchema) -> Self {
        self.register(schema);
        self
    }

    pub fn get(&self, entity_type: &str) -> Option<&EntitySchema> {
        self.schemas.get(entity_type)
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.schemas.contains_key(entity_type)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntitySchema> {
        self.schemas.values()
    }

    /// Checks that every relation targets a registered type and that no type
    /// declares a property twice.
    pub fn validate(&self) -> SchemaResult<()> {
        for schema in self.schemas.values() {
            let mut seen = HashSet::new();
            for relation in &schema.relations {
                if !seen.insert(relation.property.as_str()) {
                    return Err(SchemaError::DuplicateProperty {
                        entity_type: schema.entity_type.clone(),
                        property: relation.property.clone(),
                    });
                }
                if !self.contains(&relation.related_type) {
                    return Err(SchemaError::UnknownRelatedType {
                        entity_type: schema.entity_type.clone(),
                        property: relation.property.clone(),
                        related_type: relation.related_type.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Parses a registry from a JSON object of `type name -> schema` and
    /// validates it. Schemas are keyed by their own `entity_type`.
    pub fn from_json(json: &str) -> SchemaResult<Self> {
        let parsed: BTreeMap<String, EntitySchema> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for schema in parsed.into_values() {
            registry.register(schema);
        }
        registry.validate()?;
        Ok(registry)
    }
}
