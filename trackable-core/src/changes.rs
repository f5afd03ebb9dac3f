//! Change detection and extraction.
//!
//! - [`EntityGraph::has_changes`] scans an entity's reachable graph.
//! - [`EntityGraph::get_changes`] produces a minimal, independent
//!   [`ChangeSet`] holding only what a persistence layer needs to see.
//! - [`EntityGraph::restore_deletes`] / [`EntityGraph::remove_restored_deletes`]
//!   temporarily put cached deletes back into the live lists and take them
//!   out again.
//! - [`EntityGraph::accept_changes`] resets a graph to its new baseline.

use crate::graph::Scope;
use crate::{
    ChangeSet, CollectionKey, EntityGraph, EntityKey, TrackingCollection, TrackingResult,
    VisitationGuard,
};
use std::collections::HashSet;
use tracing::{debug, trace};
use trackable_types::TrackingState;

impl EntityGraph {
    // ── HasChanges ──────────────────────────────────────────────────

    /// Returns true if the entity, or anything reachable from it, is not
    /// `Unchanged`, or if a reachable collection holds cached deletes or
    /// pending many-to-many relation changes.
    pub fn has_changes(&self, entity: EntityKey) -> TrackingResult<bool> {
        self.check_entity(entity)?;
        Ok(self.has_changes_inner(entity, &mut VisitationGuard::new()))
    }

    /// [`has_changes`](Self::has_changes) over every live item of a
    /// collection, plus the collection's own cache and relation records.
    pub fn has_collection_changes(&self, key: CollectionKey) -> TrackingResult<bool> {
        let collection = self.tracking_collection(key)?;
        if !collection.deleted.is_empty() || !collection.relation_states.is_empty() {
            return Ok(true);
        }
        let mut guard = VisitationGuard::with_entities(collection.parent);
        Ok(collection
            .items
            .iter()
            .any(|item| self.has_changes_inner(*item, &mut guard)))
    }

    pub(crate) fn has_changes_inner(&self, entity: EntityKey, guard: &mut VisitationGuard) -> bool {
        if !guard.visit_entity(entity) {
            return false;
        }
        let node = &self.entities[entity.index()];
        if node.tracking_state.is_changed() {
            return true;
        }
        for tracker in node.references.values() {
            if let Some(target) = tracker.entity(self) {
                if self.has_changes_inner(target, guard) {
                    return true;
                }
            }
        }
        for key in node.collections.values() {
            let collection = &self.collections[key.index()];
            if !collection.deleted.is_empty() || !collection.relation_states.is_empty() {
                return true;
            }
            for item in &collection.items {
                if self.has_changes_inner(*item, guard) {
                    return true;
                }
            }
        }
        false
    }

    fn has_changes_excluding(&self, entity: EntityKey, path: &[EntityKey]) -> bool {
        let mut guard = VisitationGuard::with_entities(path.iter().copied());
        self.has_changes_inner(entity, &mut guard)
    }

    // ── RestoreDeletes / RemoveRestoredDeletes ──────────────────────

    /// Re-inserts every cached delete into its live list, recursively, with
    /// tracking suspended so no state changes. The caches keep their
    /// contents. Always pair with
    /// [`remove_restored_deletes`](Self::remove_restored_deletes).
    pub fn restore_deletes(&mut self, key: CollectionKey) -> TrackingResult<()> {
        self.check_collection(key)?;
        self.restore_deletes_inner(key, &mut VisitationGuard::new());
        Ok(())
    }

    fn restore_deletes_inner(&mut self, key: CollectionKey, guard: &mut VisitationGuard) {
        if !guard.visit_collection(key) {
            return;
        }
        {
            let mut graph = self.suspend_unchecked(key);
            let deleted = graph.collections[key.index()].deleted.clone();
            for item in deleted {
                let collection = &graph.collections[key.index()];
                if !collection.items.contains(&item) {
                    let len = collection.items.len();
                    graph.insert_item(key, len, item);
                }
            }
        }
        let items = self.collections[key.index()].items.clone();
        for item in items {
            if guard.visit_entity(item) {
                for nested in self.nested_collections(item, Scope::All) {
                    self.restore_deletes_inner(nested, guard);
                }
            }
        }
    }

    /// Removes from the live lists, recursively, every cached delete that is
    /// present there: items whose state (or many-to-many relation state) is
    /// `Deleted`. Tracking is suspended, so no state changes and the caches
    /// keep their contents.
    pub fn remove_restored_deletes(&mut self, key: CollectionKey) -> TrackingResult<()> {
        self.check_collection(key)?;
        self.remove_restored_deletes_inner(key, &mut VisitationGuard::new());
        Ok(())
    }

    fn remove_restored_deletes_inner(&mut self, key: CollectionKey, guard: &mut VisitationGuard) {
        if !guard.visit_collection(key) {
            return;
        }
        let items = self.collections[key.index()].items.clone();
        for item in &items {
            if guard.visit_entity(*item) {
                for nested in self.nested_collections(*item, Scope::All) {
                    self.remove_restored_deletes_inner(nested, guard);
                }
            }
        }

        let restored: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| self.is_restored_delete(key, **item))
            .map(|(index, _)| index)
            .collect();
        let mut graph = self.suspend_unchecked(key);
        for index in restored.into_iter().rev() {
            graph.remove_item(key, index);
        }
    }

    fn is_restored_delete(&self, key: CollectionKey, item: EntityKey) -> bool {
        let collection = &self.collections[key.index()];
        collection.deleted.contains(&item)
            && (self.entities[item.index()].tracking_state == TrackingState::Deleted
                || collection.relation_state(item) == TrackingState::Deleted)
    }

    // ── AcceptChanges ───────────────────────────────────────────────

    /// Makes the entity's current graph the new baseline.
    ///
    /// Recursively: states become `Unchanged`, modified properties are
    /// cleared, live items that are `Deleted` (or whose many-to-many relation
    /// is) leave their collections, and deleted caches and relation records
    /// are emptied.
    pub fn accept_changes(&mut self, entity: EntityKey) -> TrackingResult<()> {
        self.check_entity(entity)?;
        self.accept_changes_inner(entity, &mut VisitationGuard::new());
        Ok(())
    }

    /// [`accept_changes`](Self::accept_changes) for a whole collection.
    pub fn accept_collection_changes(&mut self, key: CollectionKey) -> TrackingResult<()> {
        self.check_collection(key)?;
        self.accept_collection_inner(key, &mut VisitationGuard::new());
        Ok(())
    }

    pub(crate) fn accept_changes_inner(&mut self, entity: EntityKey, guard: &mut VisitationGuard) {
        if !guard.visit_entity(entity) {
            return;
        }
        for nested in self.nested_collections(entity, Scope::All) {
            self.accept_collection_inner(nested, guard);
        }
        self.entities[entity.index()].reset_state(TrackingState::Unchanged);
    }

    fn accept_collection_inner(&mut self, key: CollectionKey, guard: &mut VisitationGuard) {
        if !guard.visit_collection(key) {
            return;
        }
        if !self.collections[key.index()].is_reference_tracker() {
            let collection = &self.collections[key.index()];
            let deleted: Vec<usize> = collection
                .items
                .iter()
                .enumerate()
                .filter(|(_, item)| {
                    self.entities[item.index()].tracking_state == TrackingState::Deleted
                        || collection.relation_state(**item) == TrackingState::Deleted
                })
                .map(|(index, _)| index)
                .collect();
            let mut graph = self.suspend_unchecked(key);
            for index in deleted.into_iter().rev() {
                let item = graph.remove_item(key, index);
                graph.entities[item.index()].unsubscribe(key);
                trace!("Accepted delete of {} from {}", item, key);
            }
        }
        let collection = &mut self.collections[key.index()];
        collection.deleted.clear();
        collection.relation_states.clear();

        let items = collection.items.clone();
        for item in items {
            self.accept_changes_inner(item, guard);
        }
    }

    // ── GetChanges ──────────────────────────────────────────────────

    /// Extracts the changed part of a collection's graph.
    ///
    /// Cached deletes are restored, the whole collection is deep-cloned and
    /// the restoration is undone, leaving this graph exactly as it was. The
    /// clone is then pruned: items without changes leave their collections,
    /// and reference properties pointing at entities without changes are
    /// nulled. An unchanged entity survives when something below it changed,
    /// so the result is a chain from each root to every change. The returned
    /// graph has tracking off and no shared storage with this one.
    pub fn get_changes(&mut self, key: CollectionKey) -> TrackingResult<ChangeSet> {
        self.check_collection(key)?;
        self.restore_deletes_inner(key, &mut VisitationGuard::new());
        let items = self.collections[key.index()].items.clone();
        let (mut changes, roots) = self.clone_subgraph(&items);
        self.remove_restored_deletes_inner(key, &mut VisitationGuard::new());

        // Restored deletes are live items of the clone; the caches would
        // report them twice.
        for collection in &mut changes.collections {
            collection.deleted.clear();
        }

        let kept: Vec<EntityKey> = roots
            .into_iter()
            .filter(|root| changes.has_changes_inner(*root, &mut VisitationGuard::new()))
            .collect();
        let mut pruned = HashSet::new();
        for root in &kept {
            changes.prune_unchanged(*root, &mut Vec::new(), &mut pruned);
        }

        // Re-clone to drop everything pruning left unreachable.
        let (mut compact, roots) = changes.clone_subgraph(&kept);
        let entity_type = self.collections[key.index()].entity_type.clone();
        let root = compact.alloc_collection(TrackingCollection::root(&entity_type, &[], false));
        compact.collections[root.index()].items = roots;
        debug!(
            "Extracted {} changed of {} items from {} ({} entities in change set)",
            compact.collections[root.index()].len(),
            items.len(),
            key,
            compact.entity_count()
        );
        Ok(ChangeSet::new(compact, root))
    }

    fn prune_unchanged(
        &mut self,
        entity: EntityKey,
        path: &mut Vec<EntityKey>,
        pruned: &mut HashSet<EntityKey>,
    ) {
        if !pruned.insert(entity) {
            return;
        }
        path.push(entity);

        let references: Vec<_> = self.entities[entity.index()]
            .references
            .iter()
            .map(|(property, tracker)| (property.clone(), *tracker))
            .collect();
        for (property, tracker) in references {
            let Some(target) = tracker.entity(self) else {
                continue;
            };
            if path.contains(&target) {
                continue;
            }
            if self.has_changes_excluding(target, path) {
                self.prune_unchanged(target, path, pruned);
            } else {
                self.clear_reference(entity, &property);
            }
        }

        let collections: Vec<_> = self.entities[entity.index()].collections.values().copied().collect();
        for key in collections {
            let collection = &self.collections[key.index()];
            let kept: Vec<EntityKey> = collection
                .items
                .iter()
                .copied()
                .filter(|child| {
                    path.contains(child)
                        || collection.relation_state(*child).is_changed()
                        || self.has_changes_excluding(*child, path)
                })
                .collect();
            let collection = &mut self.collections[key.index()];
            collection.relation_states.retain(|member, _| kept.contains(member));
            collection.items = kept.clone();
            for child in kept {
                if !path.contains(&child) {
                    self.prune_unchanged(child, path, pruned);
                }
            }
        }

        path.pop();
    }
}
