//! Cycle guard for recursive graph traversals.
//!
//! Every recursive algorithm in this crate threads a [`VisitationGuard`]
//! through its calls. Entities and collections are keyed by arena identity,
//! so traversal terminates on any cycle shape: parent/child back references,
//! symmetric many-to-many edges, and same-type chains of any length.

use crate::{CollectionKey, EntityKey};
use std::collections::HashSet;

/// Set of entities and collections already visited during one logical operation.
#[derive(Debug, Clone, Default)]
pub struct VisitationGuard {
    entities: HashSet<EntityKey>,
    collections: HashSet<CollectionKey>,
}

impl VisitationGuard {
    /// Creates an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a guard that treats the owning parent and the collection itself
    /// as already visited, so a traversal starting at one of the collection's
    /// items never walks back up through them.
    #[must_use]
    pub fn excluding(parent: Option<EntityKey>, collection: CollectionKey) -> Self {
        let mut guard = Self::new();
        if let Some(parent) = parent {
            guard.entities.insert(parent);
        }
        guard.collections.insert(collection);
        guard
    }

    /// Creates a guard with the given entities pre-visited.
    #[must_use]
    pub fn with_entities(entities: impl IntoIterator<Item = EntityKey>) -> Self {
        Self {
            entities: entities.into_iter().collect(),
            collections: HashSet::new(),
        }
    }

    /// Marks an entity visited. Returns false if it already was.
    pub fn visit_entity(&mut self, entity: EntityKey) -> bool {
        self.entities.insert(entity)
    }

    /// Marks a collection visited. Returns false if it already was.
    pub fn visit_collection(&mut self, collection: CollectionKey) -> bool {
        self.collections.insert(collection)
    }

    #[must_use]
    pub fn has_visited_entity(&self, entity: EntityKey) -> bool {
        self.entities.contains(&entity)
    }

    #[must_use]
    pub fn has_visited_collection(&self, collection: CollectionKey) -> bool {
        self.collections.contains(&collection)
    }
}
