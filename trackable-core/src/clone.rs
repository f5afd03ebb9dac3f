//! Structure-preserving deep copy.

use crate::graph::Scope;
use crate::{CollectionKey, EntityGraph, EntityKey, TrackingResult};
use std::collections::{HashMap, VecDeque};

impl EntityGraph {
    /// Copies everything reachable from `roots` into a fresh graph.
    ///
    /// The copy shares this graph's schemas and configuration. Shared
    /// references stay shared, cycles stay cycles, and tracking state,
    /// modified properties, identifiers, deleted-item caches and relation
    /// states are preserved. Tracking is off everywhere in the copy. Returns
    /// the copy and the keys of the copied roots, in order.
    pub fn deep_clone(&self, roots: &[EntityKey]) -> TrackingResult<(EntityGraph, Vec<EntityKey>)> {
        for root in roots {
            self.check_entity(*root)?;
        }
        Ok(self.clone_subgraph(roots))
    }

    pub(crate) fn clone_subgraph(&self, roots: &[EntityKey]) -> (EntityGraph, Vec<EntityKey>) {
        let mut entity_map: HashMap<EntityKey, EntityKey> = HashMap::new();
        let mut collection_map: HashMap<CollectionKey, CollectionKey> = HashMap::new();
        let mut entity_order = Vec::new();
        let mut collection_order = Vec::new();

        // Breadth-first discovery of the closure; map keys in discovery order.
        let mut queue: VecDeque<EntityKey> = roots.iter().copied().collect();
        while let Some(entity) = queue.pop_front() {
            if entity_map.contains_key(&entity) {
                continue;
            }
            entity_map.insert(entity, EntityKey(entity_order.len() as u32));
            entity_order.push(entity);
            for nested in self.nested_collections(entity, Scope::All) {
                if collection_map.contains_key(&nested) {
                    continue;
                }
                collection_map.insert(nested, CollectionKey(collection_order.len() as u32));
                collection_order.push(nested);
                let collection = &self.collections[nested.index()];
                queue.extend(collection.items.iter().chain(collection.deleted.iter()).copied());
            }
        }

        let map_entity = |key: &EntityKey| entity_map[key];
        let map_collection = |key: &CollectionKey| collection_map[key];

        let mut target = EntityGraph::with_config(self.schemas.clone(), self.config.clone());
        target.entities = entity_order
            .iter()
            .map(|key| {
                let mut entity = self.entities[key.index()].clone();
                entity.observers.clear();
                for tracker in entity.references.values_mut() {
                    tracker.0 = map_collection(&tracker.0);
                }
                for collection in entity.collections.values_mut() {
                    *collection = map_collection(collection);
                }
                entity
            })
            .collect();
        target.collections = collection_order
            .iter()
            .map(|key| {
                let mut collection = self.collections[key.index()].clone();
                collection.tracking = false;
                collection.items = collection.items.iter().map(map_entity).collect();
                collection.deleted = collection.deleted.iter().map(map_entity).collect();
                collection.parent = collection.parent.as_ref().map(map_entity);
                collection.relation_states = collection
                    .relation_states
                    .iter()
                    .filter_map(|(member, state)| entity_map.get(member).map(|m| (*m, *state)))
                    .collect();
                collection
            })
            .collect();

        let mapped_roots = roots.iter().map(map_entity).collect();
        (target, mapped_roots)
    }
}
