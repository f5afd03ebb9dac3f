//! Engine configuration.

use crate::TrackingResult;
use serde::{Deserialize, Serialize};

/// Options applied to every collection and journal of an [`EntityGraph`](crate::EntityGraph).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Record collection-level change notifications in the graph's journal.
    pub record_events: bool,
    /// Upper bound on journal length; the oldest events are dropped first.
    pub max_journal_len: Option<usize>,
    /// Initial `ExcludedProperties` of every collection the graph creates.
    pub excluded_properties: Vec<String>,
}

impl TrackingConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> TrackingResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Enables the change journal.
    #[must_use]
    pub fn with_events(mut self) -> Self {
        self.record_events = true;
        self
    }

    /// Adds a property name that never marks an entity `Modified`.
    #[must_use]
    pub fn exclude(mut self, property: impl Into<String>) -> Self {
        self.excluded_properties.push(property.into());
        self
    }
}
