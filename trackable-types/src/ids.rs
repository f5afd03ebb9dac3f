//! Correlation identifiers for tracked entities.
//!
//! Uses UUID v7 for time-ordered, globally unique identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque correlation key for a tracked entity.
///
/// Independent of any business primary key: it is assigned lazily the first
/// time an entity becomes tracking-relevant and survives serialization, so an
/// entity returned from a service can be matched to the instance it came from.
/// The nil UUID is never a valid identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityIdentifier(Uuid);

impl EntityIdentifier {
    /// Creates a new identifier with the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates an identifier from an existing UUID.
    ///
    /// Returns `None` for the nil UUID, which is reserved for "unassigned".
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        if uuid.is_nil() { None } else { Some(Self(uuid)) }
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parses an identifier from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        s.parse()
    }
}

impl Default for EntityIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityIdentifier {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s)?;
        Self::from_uuid(uuid).ok_or(crate::Error::NilIdentifier)
    }
}
