//! Collection-level change notifications.
//!
//! Every observable mutation a tracking collection reacts to (insertion,
//! removal, in-place property change) is reported as a [`TrackingEvent`].
//! When the graph is configured to record them, events accumulate in a
//! journal that callers drain with
//! [`EntityGraph::take_events`](crate::EntityGraph::take_events).

use crate::{CollectionKey, EntityKey};
use serde::{Deserialize, Serialize};
use trackable_types::TrackingState;

/// What happened to the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum EntityChange {
    /// The entity was inserted while tracking was on.
    Inserted {
        /// State after insertion.
        state: TrackingState,
    },

    /// The entity was removed while tracking was on.
    Removed {
        /// State after removal (`Deleted`, or `Unchanged` for a retracted add).
        state: TrackingState,
    },

    /// A scalar property changed value.
    PropertyChanged { property: String },

    /// A reference property was reassigned.
    ReferenceChanged { property: String },
}

/// A change observed by one tracking collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    /// The collection that observed the change.
    pub collection: CollectionKey,

    /// The entity the change applies to.
    pub entity: EntityKey,

    pub change: EntityChange,
}

impl TrackingEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(collection: CollectionKey, entity: EntityKey, change: EntityChange) -> Self {
        Self {
            collection,
            entity,
            change,
        }
    }

    /// Returns true if the event reports a property change of `property`.
    #[must_use]
    pub fn is_property_change(&self, property: &str) -> bool {
        matches!(
            &self.change,
            EntityChange::PropertyChanged { property: p } | EntityChange::ReferenceChanged { property: p }
                if p == property
        )
    }
}
