//! State cascades along owned relationships.
//!
//! When a collection insert or removal changes an entity's state, the change
//! flows into the entity's owned (1-1, 1-M) relationships. Many-to-one
//! references are shared principals and are never touched. Many-to-many
//! members keep their own state; only the relation records of the
//! collection change.

use crate::{EntityGraph, EntityKey, VisitationGuard};
use trackable_types::TrackingState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Entity entered a tracked collection.
    Add,
    /// Existing entity left a tracked collection.
    Delete,
    /// Entity that was only added leaves again; nothing happened server-side.
    Retract,
}

impl Transition {
    fn next_state(self, current: TrackingState) -> TrackingState {
        use TrackingState::*;
        match (self, current) {
            (Transition::Add, _) => Added,
            (Transition::Delete, Added) | (Transition::Retract, _) => Unchanged,
            (Transition::Delete, _) => Deleted,
        }
    }

    /// A deleted parent's child that was itself only added is retracted.
    fn for_child(self, child_state: TrackingState) -> Transition {
        match (self, child_state) {
            (Transition::Delete, TrackingState::Added) => Transition::Retract,
            (transition, _) => transition,
        }
    }

    fn next_relation_state(self, current: Option<TrackingState>) -> Option<TrackingState> {
        match (self, current) {
            (Transition::Add, _) => Some(TrackingState::Added),
            (Transition::Delete, Some(TrackingState::Added)) | (Transition::Retract, _) => None,
            (Transition::Delete, _) => Some(TrackingState::Deleted),
        }
    }
}

impl EntityGraph {
    pub(crate) fn cascade(&mut self, entity: EntityKey, transition: Transition, guard: &mut VisitationGuard) {
        if !guard.visit_entity(entity) {
            return;
        }
        let node = &mut self.entities[entity.index()];
        node.reset_state(transition.next_state(node.tracking_state));

        let node = &self.entities[entity.index()];
        let nested: Vec<_> = node
            .references
            .values()
            .map(|t| t.collection())
            .chain(node.collections.values().copied())
            .collect();
        for key in nested {
            let collection = &self.collections[key.index()];
            let Some(kind) = collection.kind() else { continue };
            if kind.is_owned() {
                let children = collection.items.clone();
                for child in children {
                    let child_transition = transition.for_child(self.entities[child.index()].tracking_state);
                    self.cascade(child, child_transition, guard);
                }
            } else if collection.is_many_to_many() {
                let members = collection.items.clone();
                let collection = &mut self.collections[key.index()];
                for member in members {
                    match transition.next_relation_state(collection.relation_states.get(&member).copied()) {
                        Some(state) => collection.relation_states.insert(member, state),
                        None => collection.relation_states.remove(&member),
                    };
                }
            }
        }
    }
}
