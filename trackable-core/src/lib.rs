//! Change-tracking engine for mutable entity graphs.
//!
//! An [`EntityGraph`] holds entities connected by one-to-one, one-to-many,
//! many-to-one and many-to-many relationships, as declared by a
//! [`SchemaRegistry`](trackable_model::SchemaRegistry). Entities inserted
//! into, removed from or modified inside a [`TrackingCollection`] with
//! tracking on receive a [`TrackingState`], and the transitions cascade along
//! the relationships according to their kind.
//!
//! The graph algorithms operate on that state:
//! - [`EntityGraph::get_changes`] extracts a minimal [`ChangeSet`]
//! - [`EntityGraph::has_changes`] scans a reachable graph for changes
//! - [`EntityGraph::merge_changes`] folds updated entities back in place
//! - [`EntityGraph::accept_changes`] makes the current graph the new baseline
//! - [`EntityGraph::pending_changes`] lists the writes for a persistence layer
//!
//! Every recursive algorithm is guarded by a [`VisitationGuard`], so cyclic
//! graphs of any shape terminate.

mod cascade;
mod change_set;
mod changes;
mod clone;
mod collection;
mod config;
mod entity;
mod error;
mod event;
mod graph;
mod merge;
mod pending;
mod reference;
mod suspend;
mod visit;

pub use change_set::ChangeSet;
pub use collection::{CollectionKey, CollectionRelation, TrackingCollection};
pub use config::TrackingConfig;
pub use entity::{Entity, EntityKey};
pub use error::{TrackingError, TrackingResult};
pub use event::{EntityChange, TrackingEvent};
pub use graph::EntityGraph;
pub use pending::PendingChange;
pub use reference::ReferenceTracker;
pub use suspend::TrackingSuspension;
pub use visit::VisitationGuard;

pub use trackable_types::{EntityIdentifier, RelationshipKind, TrackingState};
