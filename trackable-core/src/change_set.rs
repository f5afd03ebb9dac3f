//! The result of [`EntityGraph::get_changes`].

use crate::graph::{check_scalar_property, schema_for};
use crate::{CollectionKey, EntityGraph, EntityKey, TrackingError, TrackingResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trackable_model::{Relation, SchemaRegistry};

/// A self-contained graph of changed entities and the root collection
/// listing them.
///
/// Shares no storage with the graph it was extracted from and has tracking
/// off everywhere. Serializes to JSON with keys intact, so shared references
/// and cycles survive a round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet {
    graph: EntityGraph,
    collection: CollectionKey,
}

impl ChangeSet {
    pub(crate) fn new(graph: EntityGraph, collection: CollectionKey) -> Self {
        Self { graph, collection }
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut EntityGraph {
        &mut self.graph
    }

    /// The root collection of the change set.
    pub fn collection(&self) -> CollectionKey {
        self.collection
    }

    /// Root items, in the order of the source collection.
    pub fn items(&self) -> &[EntityKey] {
        &self.graph.collections[self.collection.index()].items
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Accepts every change in the set, as a persistence layer would after
    /// a successful save.
    pub fn accept_changes(&mut self) -> TrackingResult<()> {
        self.graph.accept_collection_changes(self.collection)
    }

    pub fn into_parts(self) -> (EntityGraph, CollectionKey) {
        (self.graph, self.collection)
    }

    pub fn to_json(&self) -> TrackingResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> TrackingResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a change set and validates it against `schemas`.
    ///
    /// Every key must resolve inside the document, every entity type must be
    /// registered, and collection items must match the collection's type.
    pub fn from_json(json: &str, schemas: impl Into<Arc<SchemaRegistry>>) -> TrackingResult<Self> {
        let mut change_set: ChangeSet = serde_json::from_str(json)?;
        change_set.graph.schemas = schemas.into();
        change_set.graph.validate_document()?;
        change_set.graph.check_collection(change_set.collection)?;
        Ok(change_set)
    }
}

impl EntityGraph {
    fn validate_document(&self) -> TrackingResult<()> {
        let invalid = |message: String| Err(TrackingError::InvalidDocument(message));
        for (index, entity) in self.entities.iter().enumerate() {
            let schema = schema_for(&self.schemas, &entity.entity_type)?;
            for property in entity.values.keys() {
                check_scalar_property(schema, property)?;
            }
            for (property, tracker) in &entity.references {
                let Some(relation) = schema.relation(property).filter(|r| r.kind.is_reference()) else {
                    return invalid(format!("entity#{index}: {property} is not a reference"));
                };
                self.check_slot(index, relation, tracker.collection())?;
                let slot = &self.collections[tracker.collection().index()];
                if slot.items.len() > 1 || !slot.deleted.is_empty() {
                    return invalid(format!("entity#{index}: {property} holds more than one entity"));
                }
            }
            for (property, collection) in &entity.collections {
                let Some(relation) = schema.relation(property).filter(|r| r.kind.is_collection()) else {
                    return invalid(format!("entity#{index}: {property} is not a collection"));
                };
                self.check_slot(index, relation, *collection)?;
            }
        }

        for (index, collection) in self.collections.iter().enumerate() {
            let members = collection
                .items
                .iter()
                .chain(&collection.deleted)
                .chain(collection.relation_states.keys())
                .chain(&collection.parent);
            for member in members {
                self.check_entity(*member)?;
            }
            for item in collection.items.iter().chain(&collection.deleted) {
                let found = &self.entities[item.index()].entity_type;
                if *found != collection.entity_type {
                    return invalid(format!(
                        "collection#{index} holds {found}, expected {}",
                        collection.entity_type
                    ));
                }
            }
            // A nested collection must be the slot its owner points at.
            match (&collection.relation, collection.parent) {
                (None, None) => {}
                (Some(relation), Some(parent)) => {
                    let owner = &self.entities[parent.index()];
                    let slot = if relation.kind.is_reference() {
                        owner.references.get(&relation.property).map(|t| t.collection())
                    } else {
                        owner.collections.get(&relation.property).copied()
                    };
                    if slot != Some(CollectionKey(index as u32)) {
                        return invalid(format!(
                            "collection#{index} is not {parent}.{}",
                            relation.property
                        ));
                    }
                }
                _ => return invalid(format!("collection#{index} has a parent but no relation")),
            }
        }
        Ok(())
    }

    /// Checks that `key` implements `relation` of entity `owner`.
    fn check_slot(&self, owner: usize, relation: &Relation, key: CollectionKey) -> TrackingResult<()> {
        self.check_collection(key)?;
        let collection = &self.collections[key.index()];
        let consistent = collection.parent == Some(EntityKey(owner as u32))
            && collection.entity_type == relation.related_type
            && collection
                .relation
                .as_ref()
                .is_some_and(|r| r.property == relation.property && r.kind == relation.kind);
        if consistent {
            Ok(())
        } else {
            Err(TrackingError::InvalidDocument(format!(
                "entity#{owner}.{}: {key} does not implement the relation",
                relation.property
            )))
        }
    }
}
