//! Reference (1-1 and M-1) properties.
//!
//! Each assigned reference property owns a [`ReferenceTracker`]: a
//! single-slot tracking collection holding the referenced entity. It routes
//! the referenced entity's change notifications through the same machinery
//! as collection properties, so a referenced entity becomes `Modified` even
//! when it is not a member of any other tracked collection.

use crate::graph::{relation_error, schema_for};
use crate::{CollectionKey, EntityGraph, EntityKey, TrackingCollection, TrackingError, TrackingResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Single-slot tracking collection behind one reference property.
///
/// Replaced on every reassignment and discarded when the reference is set to
/// `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceTracker(pub(crate) CollectionKey);

impl ReferenceTracker {
    /// The underlying collection, usable with the graph's collection accessors.
    pub fn collection(self) -> CollectionKey {
        self.0
    }

    /// The referenced entity.
    pub fn entity(self, graph: &EntityGraph) -> Option<EntityKey> {
        graph
            .collections
            .get(self.0.index())
            .and_then(|c| c.items.first().copied())
    }
}

impl EntityGraph {
    /// Returns the entity a reference property points to.
    pub fn reference(&self, key: EntityKey, property: &str) -> TrackingResult<Option<EntityKey>> {
        Ok(self
            .reference_tracker(key, property)?
            .and_then(|tracker| tracker.entity(self)))
    }

    /// Returns the tracker of a reference property; `None` when unassigned.
    pub fn reference_tracker(
        &self,
        key: EntityKey,
        property: &str,
    ) -> TrackingResult<Option<ReferenceTracker>> {
        let entity = self.entity(key)?;
        let schema = schema_for(&self.schemas, &entity.entity_type)?;
        match schema.relation(property) {
            Some(relation) if relation.kind.is_reference() => Ok(entity.references.get(property).copied()),
            _ => Err(relation_error(schema, property)),
        }
    }

    /// Assigns a reference property.
    ///
    /// A new [`ReferenceTracker`] replaces the old one. Collections observing
    /// `key` with tracking on are notified and enable tracking on the new
    /// tracker; no entity changes state. Returns false if the reference
    /// already pointed at `target`.
    pub fn set_reference(
        &mut self,
        key: EntityKey,
        property: &str,
        target: Option<EntityKey>,
    ) -> TrackingResult<bool> {
        let schemas = Arc::clone(&self.schemas);
        let schema = schema_for(&schemas, &self.entity(key)?.entity_type)?;
        let relation = match schema.relation(property) {
            Some(relation) if relation.kind.is_reference() => relation,
            _ => return Err(relation_error(schema, property)),
        };
        if let Some(target) = target {
            let found = &self.entity(target)?.entity_type;
            if *found != relation.related_type {
                return Err(TrackingError::TypeMismatch {
                    expected: relation.related_type.clone(),
                    found: found.clone(),
                });
            }
        }
        if self.reference(key, property)? == target {
            return Ok(false);
        }

        if let Some(old) = self.entities[key.index()].references.remove(property) {
            self.discard_tracker(old);
        }
        if let Some(target) = target {
            let mut tracker = TrackingCollection::nested(key, relation, &self.config.excluded_properties);
            tracker.items.push(target);
            let tracker = ReferenceTracker(self.alloc_tracker(tracker));
            self.entities[key.index()]
                .references
                .insert(property.to_string(), tracker);
        }
        debug!("Assigned {}.{} = {:?}", key, property, target);
        self.notify_property_changed(key, property);
        Ok(true)
    }

    fn alloc_tracker(&mut self, tracker: TrackingCollection) -> CollectionKey {
        match self.free_trackers.pop() {
            Some(key) => {
                self.collections[key.index()] = tracker;
                key
            }
            None => self.alloc_collection(tracker),
        }
    }

    /// Detaches a replaced tracker so it no longer observes its entity and
    /// frees its slot. Handles to it must not be used afterwards.
    fn discard_tracker(&mut self, tracker: ReferenceTracker) {
        let collection = &mut self.collections[tracker.0.index()];
        collection.tracking = false;
        let items = std::mem::take(&mut collection.items);
        for item in items {
            self.entities[item.index()].unsubscribe(tracker.0);
        }
        self.free_trackers.push(tracker.0);
    }

    /// Nulls a reference without notifying anyone. Used when pruning
    /// change sets.
    pub(crate) fn clear_reference(&mut self, key: EntityKey, property: &str) {
        if let Some(old) = self.entities[key.index()].references.remove(property) {
            self.discard_tracker(old);
        }
    }
}
