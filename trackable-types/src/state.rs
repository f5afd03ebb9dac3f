//! Tracking states and relationship kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle phase of an entity relative to its last persisted baseline.
///
/// A freshly constructed entity is `Unchanged` until a tracking collection
/// observes something happening to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingState {
    #[default]
    Unchanged,
    Added,
    Modified,
    Deleted,
}

impl TrackingState {
    /// Every state, in declaration order.
    pub const ALL: [TrackingState; 4] = [
        TrackingState::Unchanged,
        TrackingState::Added,
        TrackingState::Modified,
        TrackingState::Deleted,
    ];

    /// Returns true for anything other than `Unchanged`.
    #[must_use]
    pub const fn is_changed(self) -> bool {
        !matches!(self, TrackingState::Unchanged)
    }

    /// Returns the canonical name, matching the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TrackingState::Unchanged => "Unchanged",
            TrackingState::Added => "Added",
            TrackingState::Modified => "Modified",
            TrackingState::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrackingState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::Error::UnknownTrackingState(s.to_string()))
    }
}

/// Topology of a relationship property, declared per property.
///
/// The kind decides two things: whether the property holds one entity or a
/// collection, and how parent state transitions cascade into the related
/// entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// Reference to a dependent entity owned by this one (e.g. customer → setting).
    OneToOne,
    /// Collection of dependent entities owned by this one (e.g. order → details).
    OneToMany,
    /// Reference to a shared principal entity (e.g. detail → product).
    ManyToOne,
    /// Collection of shared entities linked through a relation (e.g. employee ↔ territory).
    ManyToMany,
}

impl RelationshipKind {
    /// Returns true if the property holds at most one related entity.
    #[must_use]
    pub const fn is_reference(self) -> bool {
        matches!(self, RelationshipKind::OneToOne | RelationshipKind::ManyToOne)
    }

    /// Returns true if the property holds an ordered collection.
    #[must_use]
    pub const fn is_collection(self) -> bool {
        !self.is_reference()
    }

    /// Returns true if the related entities are owned by the parent, so that
    /// added/deleted transitions of the parent cascade into them.
    #[must_use]
    pub const fn is_owned(self) -> bool {
        matches!(self, RelationshipKind::OneToOne | RelationshipKind::OneToMany)
    }

    /// Returns the canonical snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RelationshipKind::OneToOne => "one_to_one",
            RelationshipKind::OneToMany => "one_to_many",
            RelationshipKind::ManyToOne => "many_to_one",
            RelationshipKind::ManyToMany => "many_to_many",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_to_one" => Ok(RelationshipKind::OneToOne),
            "one_to_many" => Ok(RelationshipKind::OneToMany),
            "many_to_one" => Ok(RelationshipKind::ManyToOne),
            "many_to_many" => Ok(RelationshipKind::ManyToMany),
            other => Err(crate::Error::UnknownRelationshipKind(other.to_string())),
        }
    }
}
