//! Tracking collections.
//!
//! A [`TrackingCollection`] is an ordered list of entities of one type plus
//! the bookkeeping that turns plain mutations into tracking states: a master
//! `tracking` switch, properties exempt from `Modified` classification, the
//! owning parent, a relation-state record for many-to-many membership and a
//! cache of deleted items kept apart from the live list.
//!
//! Insertion and removal go through [`EntityGraph::insert`] and
//! [`EntityGraph::remove_at`], which apply the state transitions and cascade
//! them into the inserted/removed entity's owned relationships.

use crate::cascade::Transition;
use crate::event::EntityChange;
use crate::graph::{schema_for, Scope};
use crate::{EntityGraph, EntityKey, TrackingError, TrackingResult, VisitationGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};
use trackable_model::Relation;
use trackable_types::{RelationshipKind, TrackingState};

/// Arena handle of a tracking collection (or reference tracker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionKey(pub(crate) u32);

impl CollectionKey {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "collection#{}", self.0)
    }
}

/// The relationship property a nested collection implements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRelation {
    pub property: String,
    pub kind: RelationshipKind,
}

/// An observable, ordered container of entities of one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingCollection {
    pub(crate) entity_type: String,
    pub(crate) items: Vec<EntityKey>,
    /// Tracking is never serialized: a deserialized graph starts untracked.
    #[serde(skip)]
    pub(crate) tracking: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub(crate) excluded_properties: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) parent: Option<EntityKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) relation: Option<CollectionRelation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) deleted: Vec<EntityKey>,
    /// Many-to-many membership changes: `Added` or `Deleted` per member.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) relation_states: BTreeMap<EntityKey, TrackingState>,
}

impl TrackingCollection {
    pub(crate) fn root(entity_type: &str, excluded: &[String], tracking: bool) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            items: Vec::new(),
            tracking,
            excluded_properties: excluded.iter().cloned().collect(),
            parent: None,
            relation: None,
            deleted: Vec::new(),
            relation_states: BTreeMap::new(),
        }
    }

    pub(crate) fn nested(parent: EntityKey, relation: &Relation, excluded: &[String]) -> Self {
        Self {
            parent: Some(parent),
            relation: Some(CollectionRelation {
                property: relation.property.clone(),
                kind: relation.kind,
            }),
            ..Self::root(&relation.related_type, excluded, false)
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Live items, in order. Cached deletes are not included.
    pub fn items(&self) -> &[EntityKey] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, entity: EntityKey) -> bool {
        self.items.contains(&entity)
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn excluded_properties(&self) -> &BTreeSet<String> {
        &self.excluded_properties
    }

    /// The entity owning this collection; `None` for root collections.
    pub fn parent(&self) -> Option<EntityKey> {
        self.parent
    }

    pub fn relation(&self) -> Option<&CollectionRelation> {
        self.relation.as_ref()
    }

    pub fn kind(&self) -> Option<RelationshipKind> {
        self.relation.as_ref().map(|r| r.kind)
    }

    /// True for the single-slot collections behind reference properties.
    pub fn is_reference_tracker(&self) -> bool {
        self.kind().is_some_and(|k| k.is_reference())
    }

    pub(crate) fn is_many_to_many(&self) -> bool {
        self.kind() == Some(RelationshipKind::ManyToMany)
    }

    /// Removed items retained so they still show up as deletes.
    pub fn deleted_items(&self) -> &[EntityKey] {
        &self.deleted
    }

    /// Membership state of `entity` in a many-to-many collection:
    /// `Added`/`Deleted` for pending relation changes, `Unchanged` otherwise.
    pub fn relation_state(&self, entity: EntityKey) -> TrackingState {
        self.relation_states
            .get(&entity)
            .copied()
            .unwrap_or(TrackingState::Unchanged)
    }

    pub(crate) fn cache_delete(&mut self, entity: EntityKey) {
        if !self.deleted.contains(&entity) {
            self.deleted.push(entity);
        }
    }

    pub(crate) fn uncache(&mut self, entity: EntityKey) -> bool {
        let before = self.deleted.len();
        self.deleted.retain(|e| *e != entity);
        self.deleted.len() != before
    }
}

impl EntityGraph {
    // ── Construction ────────────────────────────────────────────────

    /// Creates an empty root collection with tracking off.
    pub fn new_collection(&mut self, entity_type: &str) -> TrackingResult<CollectionKey> {
        self.new_collection_with_tracking(entity_type, false)
    }

    /// Creates an empty root collection with the given tracking flag.
    pub fn new_collection_with_tracking(
        &mut self,
        entity_type: &str,
        tracking: bool,
    ) -> TrackingResult<CollectionKey> {
        schema_for(&self.schemas, entity_type)?;
        let collection = TrackingCollection::root(entity_type, &self.config.excluded_properties, tracking);
        Ok(self.alloc_collection(collection))
    }

    /// Creates a root collection holding `items` and turns tracking on.
    ///
    /// The items keep their current states; freshly created entities are
    /// therefore `Unchanged`.
    pub fn track(&mut self, entity_type: &str, items: &[EntityKey]) -> TrackingResult<CollectionKey> {
        let collection = self.new_collection(entity_type)?;
        for &item in items {
            self.push(collection, item)?;
        }
        self.set_tracking(collection, true)?;
        Ok(collection)
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn tracking_collection(&self, key: CollectionKey) -> TrackingResult<&TrackingCollection> {
        self.collections
            .get(key.index())
            .ok_or(TrackingError::UnknownCollection(key))
    }

    pub(crate) fn check_collection(&self, key: CollectionKey) -> TrackingResult<()> {
        self.tracking_collection(key).map(|_| ())
    }

    /// Live items of a collection.
    pub fn items(&self, key: CollectionKey) -> TrackingResult<&[EntityKey]> {
        Ok(self.tracking_collection(key)?.items())
    }

    pub fn is_tracking(&self, key: CollectionKey) -> TrackingResult<bool> {
        Ok(self.tracking_collection(key)?.tracking)
    }

    /// Replaces the set of properties that never mark an entity `Modified`.
    pub fn set_excluded_properties<I, S>(&mut self, key: CollectionKey, properties: I) -> TrackingResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.check_collection(key)?;
        self.collections[key.index()].excluded_properties =
            properties.into_iter().map(Into::into).collect();
        Ok(())
    }

    /// Shallow view of a collection's changes.
    ///
    /// With `cached_deletes_only`, returns the deleted-items cache untouched.
    /// Otherwise returns the live items whose state (or many-to-many relation
    /// state) is not `Unchanged`, followed by the cached deletes.
    pub fn collection_changes(
        &self,
        key: CollectionKey,
        cached_deletes_only: bool,
    ) -> TrackingResult<Vec<EntityKey>> {
        let collection = self.tracking_collection(key)?;
        if cached_deletes_only {
            return Ok(collection.deleted.clone());
        }
        let mut changes: Vec<EntityKey> = collection
            .items
            .iter()
            .copied()
            .filter(|item| {
                self.entities[item.index()].tracking_state.is_changed()
                    || collection.relation_state(*item).is_changed()
            })
            .collect();
        for deleted in &collection.deleted {
            if !changes.contains(deleted) {
                changes.push(*deleted);
            }
        }
        Ok(changes)
    }

    // ── Tracking switch ─────────────────────────────────────────────

    /// Turns tracking on or off for a collection and, recursively, for every
    /// relationship collection and reference tracker reachable from its items.
    ///
    /// Enabling subscribes each live item to change notifications and assigns
    /// missing identifiers; disabling unsubscribes but keeps identifiers.
    /// Idempotent, and each collection and entity is processed once per call.
    pub fn set_tracking(&mut self, key: CollectionKey, enabled: bool) -> TrackingResult<()> {
        self.check_collection(key)?;
        debug!("Setting tracking={} on {}", enabled, key);
        self.set_tracking_inner(key, enabled, &mut VisitationGuard::new(), Scope::All);
        Ok(())
    }

    pub(crate) fn set_tracking_inner(
        &mut self,
        key: CollectionKey,
        enabled: bool,
        guard: &mut VisitationGuard,
        scope: Scope,
    ) {
        if !guard.visit_collection(key) {
            return;
        }
        self.collections[key.index()].tracking = enabled;
        let items = self.collections[key.index()].items.clone();
        for item in items {
            if enabled {
                self.entities[item.index()].subscribe(key);
                self.assign_identifier(item);
            } else {
                self.entities[item.index()].unsubscribe(key);
            }
            if guard.visit_entity(item) {
                self.set_nested_tracking(item, enabled, guard, scope);
            }
        }
    }

    pub(crate) fn set_nested_tracking(
        &mut self,
        entity: EntityKey,
        enabled: bool,
        guard: &mut VisitationGuard,
        scope: Scope,
    ) {
        for nested in self.nested_collections(entity, scope) {
            self.set_tracking_inner(nested, enabled, guard, scope);
        }
    }

    // ── Mutation ────────────────────────────────────────────────────

    /// Appends an entity.
    pub fn push(&mut self, key: CollectionKey, entity: EntityKey) -> TrackingResult<()> {
        let len = self.tracking_collection(key)?.len();
        self.insert(key, len, entity)
    }

    /// Inserts an entity at `index`.
    ///
    /// With tracking on: assigns a missing identifier, subscribes to the
    /// entity, enables tracking on its relationships (never walking back
    /// through the parent or this collection) and marks it, with its owned
    /// subtree, `Added`, unless it comes back out of the deleted-items cache
    /// already `Added` or `Modified`. In a many-to-many collection only the
    /// relation is marked `Added`; re-linking a cached member cancels the
    /// pending unlink instead.
    /// With tracking off the entity is inserted with no side effects.
    pub fn insert(&mut self, key: CollectionKey, index: usize, entity: EntityKey) -> TrackingResult<()> {
        let collection = self.tracking_collection(key)?;
        if collection.is_reference_tracker() {
            return Err(TrackingError::ReferenceSlot(key));
        }
        let found = &self.entity(entity)?.entity_type;
        if *found != collection.entity_type {
            return Err(TrackingError::TypeMismatch {
                expected: collection.entity_type.clone(),
                found: found.clone(),
            });
        }
        if index > collection.len() {
            return Err(TrackingError::IndexOutOfBounds {
                index,
                len: collection.len(),
            });
        }
        self.insert_item(key, index, entity);
        Ok(())
    }

    pub(crate) fn insert_item(&mut self, key: CollectionKey, index: usize, entity: EntityKey) {
        if !self.collections[key.index()].tracking {
            self.collections[key.index()].items.insert(index, entity);
            trace!("Inserted {} into untracked {}", entity, key);
            return;
        }

        self.assign_identifier(entity);
        self.entities[entity.index()].subscribe(key);
        let parent = self.collections[key.index()].parent;
        let mut guard = VisitationGuard::excluding(parent, key);
        guard.visit_entity(entity);
        self.set_nested_tracking(entity, true, &mut guard, Scope::All);

        let collection = &mut self.collections[key.index()];
        let was_cached = collection.uncache(entity);
        if collection.is_many_to_many() {
            if was_cached {
                collection.relation_states.remove(&entity);
            } else {
                collection.relation_states.insert(entity, TrackingState::Added);
            }
        } else {
            // A pending add or update taken back out of the cache keeps its state.
            let pending = matches!(
                self.entities[entity.index()].tracking_state,
                TrackingState::Added | TrackingState::Modified
            );
            if !(was_cached && pending) {
                self.cascade(entity, Transition::Add, &mut VisitationGuard::excluding(parent, key));
            }
        }
        self.collections[key.index()].items.insert(index, entity);

        let state = self.current_state(key, entity);
        debug!("Inserted {} into {} as {}", entity, key, state);
        self.emit(key, entity, EntityChange::Inserted { state });
    }

    /// Removes the first occurrence of `entity`. Returns false if absent.
    pub fn remove(&mut self, key: CollectionKey, entity: EntityKey) -> TrackingResult<bool> {
        let position = self
            .tracking_collection(key)?
            .items
            .iter()
            .position(|e| *e == entity);
        match position {
            Some(index) => self.remove_at(key, index).map(|_| true),
            None => Ok(false),
        }
    }

    /// Removes the entity at `index` and returns it.
    ///
    /// With tracking on: unsubscribes, disables tracking on the entity's owned
    /// relationships, and applies the removal transition: an `Added` entity
    /// (and its owned subtree) is retracted to `Unchanged`, anything else
    /// becomes `Deleted` and is cached. In a many-to-many collection the
    /// entity's own state is untouched and only the relation is deleted, or
    /// retracted if it was only just added.
    pub fn remove_at(&mut self, key: CollectionKey, index: usize) -> TrackingResult<EntityKey> {
        let collection = self.tracking_collection(key)?;
        if collection.is_reference_tracker() {
            return Err(TrackingError::ReferenceSlot(key));
        }
        if index >= collection.len() {
            return Err(TrackingError::IndexOutOfBounds {
                index,
                len: collection.len(),
            });
        }
        Ok(self.remove_item(key, index))
    }

    pub(crate) fn remove_item(&mut self, key: CollectionKey, index: usize) -> EntityKey {
        let entity = self.collections[key.index()].items.remove(index);
        if !self.collections[key.index()].tracking {
            trace!("Removed {} from untracked {}", entity, key);
            return entity;
        }

        self.entities[entity.index()].unsubscribe(key);
        let parent = self.collections[key.index()].parent;
        let mut guard = VisitationGuard::excluding(parent, key);
        guard.visit_entity(entity);
        self.set_nested_tracking(entity, false, &mut guard, Scope::Owned);

        if self.collections[key.index()].is_many_to_many() {
            let collection = &mut self.collections[key.index()];
            if collection.relation_states.remove(&entity) != Some(TrackingState::Added) {
                collection.relation_states.insert(entity, TrackingState::Deleted);
                collection.cache_delete(entity);
            }
        } else {
            let transition = if self.entities[entity.index()].tracking_state == TrackingState::Added {
                Transition::Retract
            } else {
                Transition::Delete
            };
            self.cascade(entity, transition, &mut VisitationGuard::excluding(parent, key));
            if self.entities[entity.index()].tracking_state.is_changed() {
                self.collections[key.index()].cache_delete(entity);
            }
        }

        let state = self.current_state(key, entity);
        debug!("Removed {} from {} as {}", entity, key, state);
        self.emit(key, entity, EntityChange::Removed { state });
        entity
    }

    /// Entity state, or relation state for many-to-many membership.
    fn current_state(&self, key: CollectionKey, entity: EntityKey) -> TrackingState {
        let collection = &self.collections[key.index()];
        if collection.is_many_to_many() {
            collection.relation_state(entity)
        } else {
            self.entities[entity.index()].tracking_state
        }
    }

    // ── Notifications ───────────────────────────────────────────────

    /// Reacts to a property change of an observed entity.
    pub(crate) fn on_property_changed(&mut self, key: CollectionKey, entity: EntityKey, property: &str) {
        let collection = &self.collections[key.index()];
        if !collection.tracking || collection.excluded_properties.contains(property) {
            return;
        }

        let schemas = Arc::clone(&self.schemas);
        let is_relation = schemas
            .get(&self.entities[entity.index()].entity_type)
            .and_then(|s| s.relation(property))
            .is_some();
        if is_relation {
            // A reassigned reference inherits this collection's tracking.
            if let Some(tracker) = self.entities[entity.index()].references.get(property).copied() {
                self.set_tracking_inner(tracker.collection(), true, &mut VisitationGuard::new(), Scope::All);
            }
            self.emit(key, entity, EntityChange::ReferenceChanged { property: property.to_string() });
            return;
        }

        self.entities[entity.index()].mark_property_modified(property);
        trace!("{}.{} changed, now {}", entity, property, self.entities[entity.index()].tracking_state);
        self.emit(key, entity, EntityChange::PropertyChanged { property: property.to_string() });
    }
}
