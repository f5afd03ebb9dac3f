//! The entity arena.
//!
//! An [`EntityGraph`] owns every entity and tracking collection of one object
//! graph. Relationships are stored as keys, so cycles and shared references
//! are ordinary data and a structure-preserving copy is a key remapping.

use crate::event::{EntityChange, TrackingEvent};
use crate::{
    CollectionKey, Entity, EntityKey, TrackingCollection, TrackingConfig, TrackingError,
    TrackingResult,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::trace;
use trackable_model::{EntitySchema, SchemaRegistry};
use trackable_types::{EntityIdentifier, TrackingState};

/// Property names reserved for tracking metadata, compared ignoring case and
/// underscores.
const RESERVED_PROPERTIES: [&str; 3] = ["trackingstate", "modifiedproperties", "entityidentifier"];

fn is_reserved(property: &str) -> bool {
    let normalized: String = property
        .chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    RESERVED_PROPERTIES.contains(&normalized.as_str())
}

/// Arena of entities and tracking collections sharing one schema registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityGraph {
    #[serde(skip)]
    pub(crate) schemas: Arc<SchemaRegistry>,
    #[serde(skip)]
    pub(crate) config: TrackingConfig,
    pub(crate) entities: Vec<Entity>,
    pub(crate) collections: Vec<TrackingCollection>,
    #[serde(skip)]
    pub(crate) journal: VecDeque<TrackingEvent>,
    /// Slots of discarded reference trackers, reused by the next assignment.
    #[serde(skip)]
    pub(crate) free_trackers: Vec<CollectionKey>,
}

impl EntityGraph {
    /// Creates an empty graph with the default configuration.
    pub fn new(schemas: impl Into<Arc<SchemaRegistry>>) -> Self {
        Self::with_config(schemas, TrackingConfig::default())
    }

    /// Creates an empty graph.
    pub fn with_config(schemas: impl Into<Arc<SchemaRegistry>>, config: TrackingConfig) -> Self {
        Self {
            schemas: schemas.into(),
            config,
            entities: Vec::new(),
            collections: Vec::new(),
            journal: VecDeque::new(),
            free_trackers: Vec::new(),
        }
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Number of entities ever allocated in this arena.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of collection slots (including reference trackers) in the arena.
    /// Slots of discarded trackers are reused, so reassigning a reference
    /// does not grow it.
    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    /// Iterates over every entity key of the arena.
    pub fn entity_keys(&self) -> impl Iterator<Item = EntityKey> + '_ {
        (0..self.entities.len()).map(|i| EntityKey(i as u32))
    }

    // ── Entities ────────────────────────────────────────────────────

    /// Creates an untracked, `Unchanged` entity.
    ///
    /// `values` must be a JSON object (or null for no scalars). One tracking
    /// collection, with tracking off, is created for every collection
    /// relation of the type.
    pub fn create_entity(&mut self, entity_type: &str, values: Value) -> TrackingResult<EntityKey> {
        let schemas = Arc::clone(&self.schemas);
        let schema = schema_for(&schemas, entity_type)?;
        let values = match values {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return Err(TrackingError::InvalidValues(other.to_string())),
        };
        for property in values.keys() {
            check_scalar_property(schema, property)?;
        }

        let key = EntityKey(self.entities.len() as u32);
        self.entities.push(Entity::new(entity_type, values));
        for relation in schema.collections() {
            let collection = self.alloc_collection(TrackingCollection::nested(
                key,
                relation,
                &self.config.excluded_properties,
            ));
            self.entities[key.index()]
                .collections
                .insert(relation.property.clone(), collection);
        }
        trace!("Created {} {}", entity_type, key);
        Ok(key)
    }

    pub fn entity(&self, key: EntityKey) -> TrackingResult<&Entity> {
        self.entities
            .get(key.index())
            .ok_or(TrackingError::UnknownEntity(key))
    }

    pub(crate) fn check_entity(&self, key: EntityKey) -> TrackingResult<()> {
        self.entity(key).map(|_| ())
    }

    pub fn tracking_state(&self, key: EntityKey) -> TrackingResult<TrackingState> {
        Ok(self.entity(key)?.tracking_state)
    }

    /// Sets the state directly.
    ///
    /// This never cascades into related entities and never fires property
    /// notifications. Setting `Unchanged` clears the modified properties.
    pub fn set_tracking_state(&mut self, key: EntityKey, state: TrackingState) -> TrackingResult<()> {
        self.check_entity(key)?;
        let entity = &mut self.entities[key.index()];
        entity.tracking_state = state;
        if state == TrackingState::Unchanged {
            entity.modified_properties = None;
        }
        Ok(())
    }

    pub fn modified_properties(&self, key: EntityKey) -> TrackingResult<Option<&BTreeSet<String>>> {
        Ok(self.entity(key)?.modified_properties.as_ref())
    }

    /// Replaces the modified-properties set. An empty set is stored as `None`,
    /// and an `Unchanged` entity never carries one.
    pub fn set_modified_properties(
        &mut self,
        key: EntityKey,
        properties: Option<BTreeSet<String>>,
    ) -> TrackingResult<()> {
        self.check_entity(key)?;
        let entity = &mut self.entities[key.index()];
        let changed = entity.tracking_state.is_changed();
        entity.modified_properties = properties.filter(|p| changed && !p.is_empty());
        Ok(())
    }

    pub fn entity_identifier(&self, key: EntityKey) -> TrackingResult<Option<EntityIdentifier>> {
        Ok(self.entity(key)?.entity_identifier)
    }

    /// Assigns an identifier if the entity has none and its type is
    /// equatable. Returns the (possibly pre-existing) identifier.
    pub fn ensure_identifier(&mut self, key: EntityKey) -> TrackingResult<Option<EntityIdentifier>> {
        schema_for(&self.schemas, &self.entity(key)?.entity_type)?;
        Ok(self.assign_identifier(key))
    }

    pub(crate) fn assign_identifier(&mut self, key: EntityKey) -> Option<EntityIdentifier> {
        let equatable = self
            .schemas
            .get(&self.entities[key.index()].entity_type)
            .is_some_and(|s| s.equatable);
        let entity = &mut self.entities[key.index()];
        if equatable && entity.entity_identifier.is_none() {
            entity.entity_identifier = Some(EntityIdentifier::new());
        }
        entity.entity_identifier
    }

    /// Two entities are equatable when both carry an identifier and the
    /// identifiers are equal. Entities without one are never equatable,
    /// not even to themselves.
    pub fn is_equatable(&self, a: EntityKey, b: EntityKey) -> TrackingResult<bool> {
        let (a, b) = (self.entity(a)?, self.entity(b)?);
        Ok(a.entity_identifier.is_some() && a.entity_identifier == b.entity_identifier)
    }

    /// Returns a scalar property.
    pub fn value(&self, key: EntityKey, property: &str) -> TrackingResult<Option<&Value>> {
        Ok(self.entity(key)?.values.get(property))
    }

    /// Writes a scalar property and notifies every observing collection.
    ///
    /// Writing a value equal to the current one is a no-op. Returns whether
    /// the value changed.
    pub fn set_value(
        &mut self,
        key: EntityKey,
        property: &str,
        value: impl Into<Value>,
    ) -> TrackingResult<bool> {
        let schemas = Arc::clone(&self.schemas);
        let schema = schema_for(&schemas, &self.entity(key)?.entity_type)?;
        check_scalar_property(schema, property)?;
        Ok(self.write_value(key, property, value.into()))
    }

    /// Unchecked write used by merge; the property was already validated by
    /// the graph that produced the value.
    pub(crate) fn write_value(&mut self, key: EntityKey, property: &str, value: Value) -> bool {
        let entity = &mut self.entities[key.index()];
        if entity.values.get(property) == Some(&value) {
            return false;
        }
        entity.values.insert(property.to_string(), value);
        self.notify_property_changed(key, property);
        true
    }

    /// Routes a property-changed notification to every subscribed collection.
    pub(crate) fn notify_property_changed(&mut self, key: EntityKey, property: &str) {
        let observers = self.entities[key.index()].observers.clone();
        for collection in observers {
            self.on_property_changed(collection, key, property);
        }
    }

    /// Returns the tracking collection behind a collection property.
    pub fn collection(&self, key: EntityKey, property: &str) -> TrackingResult<CollectionKey> {
        let entity = self.entity(key)?;
        if let Some(collection) = entity.collections.get(property) {
            return Ok(*collection);
        }
        let schema = schema_for(&self.schemas, &entity.entity_type)?;
        Err(relation_error(schema, property))
    }

    // ── Journal ─────────────────────────────────────────────────────

    pub(crate) fn emit(&mut self, collection: CollectionKey, entity: EntityKey, change: EntityChange) {
        if !self.config.record_events {
            return;
        }
        self.journal.push_back(TrackingEvent::new(collection, entity, change));
        if let Some(max) = self.config.max_journal_len {
            while self.journal.len() > max {
                self.journal.pop_front();
            }
        }
    }

    /// Drains the change journal.
    pub fn take_events(&mut self) -> Vec<TrackingEvent> {
        self.journal.drain(..).collect()
    }

    // ── Arena ───────────────────────────────────────────────────────

    pub(crate) fn alloc_collection(&mut self, collection: TrackingCollection) -> CollectionKey {
        let key = CollectionKey(self.collections.len() as u32);
        self.collections.push(collection);
        key
    }

    /// The entities and collections directly related to `entity`:
    /// reference trackers first, then collection properties.
    pub(crate) fn nested_collections(&self, entity: EntityKey, scope: Scope) -> Vec<CollectionKey> {
        let node = &self.entities[entity.index()];
        node.references
            .values()
            .map(|tracker| tracker.collection())
            .chain(node.collections.values().copied())
            .filter(|c| scope.includes(&self.collections[c.index()]))
            .collect()
    }
}

/// Which relationships a recursive traversal follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    /// Every reference and collection property.
    All,
    /// Only owned (1-1 and 1-M) relationships.
    Owned,
}

impl Scope {
    fn includes(self, collection: &TrackingCollection) -> bool {
        match self {
            Scope::All => true,
            Scope::Owned => collection.kind().is_some_and(|k| k.is_owned()),
        }
    }
}

pub(crate) fn check_scalar_property(schema: &EntitySchema, property: &str) -> TrackingResult<()> {
    if is_reserved(property) || schema.relation(property).is_some() {
        return Err(TrackingError::ReservedProperty(property.to_string()));
    }
    Ok(())
}

/// Looks up a registered schema.
pub(crate) fn schema_for<'a>(
    schemas: &'a SchemaRegistry,
    entity_type: &str,
) -> TrackingResult<&'a EntitySchema> {
    schemas
        .get(entity_type)
        .ok_or_else(|| TrackingError::UnknownEntityType(entity_type.to_string()))
}

/// Builds the error for a property used with the wrong relationship shape.
pub(crate) fn relation_error(schema: &EntitySchema, property: &str) -> TrackingError {
    let entity_type = schema.entity_type.clone();
    let property = property.to_string();
    match schema.relation(&property) {
        None => TrackingError::UnknownProperty {
            entity_type,
            property,
        },
        Some(relation) if relation.kind.is_reference() => TrackingError::NotACollection {
            entity_type,
            property,
        },
        Some(_) => TrackingError::NotAReference {
            entity_type,
            property,
        },
    }
}
