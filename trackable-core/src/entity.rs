use crate::{CollectionKey, ReferenceTracker};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use trackable_types::{EntityIdentifier, TrackingState};

/// Arena handle of an entity inside one [`EntityGraph`](crate::EntityGraph).
///
/// Two keys are equal exactly when they address the same entity instance, so
/// key equality is the graph's notion of reference identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(pub(crate) u32);

impl EntityKey {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// A node of a tracked object graph.
///
/// Scalar properties are a JSON object; relationship properties are slots
/// declared by the entity type's schema. The tracking metadata (state,
/// modified properties, identifier) is owned by the collections observing
/// the entity and is only changed through the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub(crate) entity_type: String,
    #[serde(default)]
    pub(crate) tracking_state: TrackingState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) modified_properties: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) entity_identifier: Option<EntityIdentifier>,
    #[serde(default)]
    pub(crate) values: Map<String, Value>,
    /// Assigned reference properties only; an absent key means `None`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) references: BTreeMap<String, ReferenceTracker>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) collections: BTreeMap<String, CollectionKey>,
    /// Collections currently subscribed to this entity's property changes.
    #[serde(skip)]
    pub(crate) observers: Vec<CollectionKey>,
}

impl Entity {
    pub(crate) fn new(entity_type: &str, values: Map<String, Value>) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            tracking_state: TrackingState::Unchanged,
            modified_properties: None,
            entity_identifier: None,
            values,
            references: BTreeMap::new(),
            collections: BTreeMap::new(),
            observers: Vec::new(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn tracking_state(&self) -> TrackingState {
        self.tracking_state
    }

    /// Names of the properties changed since the baseline; `None` when the
    /// entity is unchanged or when no individual property was recorded.
    pub fn modified_properties(&self) -> Option<&BTreeSet<String>> {
        self.modified_properties.as_ref()
    }

    pub fn entity_identifier(&self) -> Option<EntityIdentifier> {
        self.entity_identifier
    }

    /// All scalar properties.
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Returns a scalar property.
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    /// Extract a string property.
    pub fn get_str(&self, property: &str) -> Option<&str> {
        self.get(property).and_then(|v| v.as_str())
    }

    /// Extract a boolean property.
    pub fn get_bool(&self, property: &str) -> Option<bool> {
        self.get(property).and_then(|v| v.as_bool())
    }

    /// Extract a numeric property.
    pub fn get_number(&self, property: &str) -> Option<f64> {
        self.get(property).and_then(|v| v.as_f64())
    }

    /// Extract an integer property.
    pub fn get_i64(&self, property: &str) -> Option<i64> {
        self.get(property).and_then(|v| v.as_i64())
    }

    /// The reference tracker of an assigned reference property.
    pub fn reference_tracker(&self, property: &str) -> Option<ReferenceTracker> {
        self.references.get(property).copied()
    }

    /// The tracking collection behind a collection property.
    pub fn collection(&self, property: &str) -> Option<CollectionKey> {
        self.collections.get(property).copied()
    }

    pub(crate) fn subscribe(&mut self, collection: CollectionKey) {
        if !self.observers.contains(&collection) {
            self.observers.push(collection);
        }
    }

    pub(crate) fn unsubscribe(&mut self, collection: CollectionKey) {
        self.observers.retain(|c| *c != collection);
    }

    pub(crate) fn mark_property_modified(&mut self, property: &str) {
        match self.tracking_state {
            TrackingState::Unchanged => {
                self.tracking_state = TrackingState::Modified;
                self.modified_properties = Some(BTreeSet::from([property.to_string()]));
            }
            TrackingState::Modified => {
                self.modified_properties
                    .get_or_insert_with(BTreeSet::new)
                    .insert(property.to_string());
            }
            TrackingState::Added | TrackingState::Deleted => {}
        }
    }

    pub(crate) fn reset_state(&mut self, state: TrackingState) {
        self.tracking_state = state;
        self.modified_properties = None;
    }
}
