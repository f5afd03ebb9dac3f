//! Flat export of a tracked graph for a persistence layer.

use crate::graph::Scope;
use crate::{CollectionKey, EntityGraph, EntityKey, TrackingResult, VisitationGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use trackable_types::{RelationshipKind, TrackingState};

/// One write a persistence layer has to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PendingChange {
    Insert {
        entity: EntityKey,
    },
    /// `properties` is `None` when the entity was marked `Modified` without
    /// a property list, meaning every property is written.
    Update {
        entity: EntityKey,
        properties: Option<BTreeSet<String>>,
    },
    Delete {
        entity: EntityKey,
    },
    /// A many-to-many link to create.
    Relate {
        parent: EntityKey,
        property: String,
        child: EntityKey,
    },
    /// A many-to-many link to remove. The child entity itself stays.
    Unrelate {
        parent: EntityKey,
        property: String,
        child: EntityKey,
    },
}

impl PendingChange {
    /// The entity written by this change; the child for link changes.
    pub fn entity(&self) -> EntityKey {
        match self {
            PendingChange::Insert { entity }
            | PendingChange::Update { entity, .. }
            | PendingChange::Delete { entity } => *entity,
            PendingChange::Relate { child, .. } | PendingChange::Unrelate { child, .. } => *child,
        }
    }
}

#[derive(Default)]
struct Plan {
    visited: VisitationGuard,
    /// Entities with principals before dependents and parents before children.
    order: Vec<EntityKey>,
    relates: Vec<PendingChange>,
    unrelates: Vec<PendingChange>,
}

impl EntityGraph {
    /// Lists the writes needed to persist a collection's graph, in an order
    /// that keeps foreign keys satisfied.
    ///
    /// Inserts and updates come first, principals (many-to-one targets)
    /// before their dependents and parents before owned children. Link
    /// changes follow, creations before removals. Deletes come last in the
    /// reverse order. Cached deletes are included; many-to-many removals are
    /// only ever link removals.
    pub fn pending_changes(&self, key: CollectionKey) -> TrackingResult<Vec<PendingChange>> {
        self.check_collection(key)?;
        let mut plan = Plan::default();
        self.plan_collection(key, &mut plan);

        let mut changes: Vec<PendingChange> = plan
            .order
            .iter()
            .filter_map(|entity| {
                let node = &self.entities[entity.index()];
                match node.tracking_state {
                    TrackingState::Added => Some(PendingChange::Insert { entity: *entity }),
                    TrackingState::Modified => Some(PendingChange::Update {
                        entity: *entity,
                        properties: node.modified_properties.clone(),
                    }),
                    TrackingState::Unchanged | TrackingState::Deleted => None,
                }
            })
            .collect();
        changes.extend(plan.relates);
        changes.extend(plan.unrelates);
        changes.extend(
            plan.order
                .iter()
                .rev()
                .filter(|entity| self.entities[entity.index()].tracking_state == TrackingState::Deleted)
                .map(|entity| PendingChange::Delete { entity: *entity }),
        );
        Ok(changes)
    }

    fn plan_collection(&self, key: CollectionKey, plan: &mut Plan) {
        if !plan.visited.visit_collection(key) {
            return;
        }
        let collection = &self.collections[key.index()];
        if let (Some(parent), Some(relation)) = (collection.parent, &collection.relation) {
            for (child, state) in &collection.relation_states {
                let (property, child) = (relation.property.clone(), *child);
                match state {
                    TrackingState::Added => plan.relates.push(PendingChange::Relate {
                        parent,
                        property,
                        child,
                    }),
                    TrackingState::Deleted => plan.unrelates.push(PendingChange::Unrelate {
                        parent,
                        property,
                        child,
                    }),
                    TrackingState::Unchanged | TrackingState::Modified => {}
                }
            }
        }

        let mut members = collection.items.clone();
        for deleted in &collection.deleted {
            if !members.contains(deleted) {
                members.push(*deleted);
            }
        }
        for member in members {
            self.plan_entity(member, plan);
        }
    }

    fn plan_entity(&self, entity: EntityKey, plan: &mut Plan) {
        if !plan.visited.visit_entity(entity) {
            return;
        }
        let (principals, dependents): (Vec<CollectionKey>, Vec<CollectionKey>) = self
            .nested_collections(entity, Scope::All)
            .into_iter()
            .partition(|c| self.collections[c.index()].kind() == Some(RelationshipKind::ManyToOne));
        for principal in principals {
            self.plan_collection(principal, plan);
        }
        plan.order.push(entity);
        for nested in dependents {
            self.plan_collection(nested, plan);
        }
    }
}
