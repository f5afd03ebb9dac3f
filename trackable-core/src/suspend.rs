//! Scoped suspension of change tracking.
//!
//! [`TrackingSuspension`] switches the `tracking` flag of one or more
//! collections off and restores each collection's previous value when the
//! guard drops, on every exit path. Suspensions nest: an inner guard restores
//! what the outer guard left, never a hard-coded `true`.

use crate::{CollectionKey, EntityGraph, EntityKey, TrackingResult};
use std::ops::{Deref, DerefMut};

/// Mutable access to a graph with some collections' tracking suspended.
#[derive(Debug)]
pub struct TrackingSuspension<'g> {
    graph: &'g mut EntityGraph,
    saved: Vec<(CollectionKey, bool)>,
}

impl<'g> TrackingSuspension<'g> {
    fn new(graph: &'g mut EntityGraph, collections: Vec<CollectionKey>) -> Self {
        let saved = collections
            .into_iter()
            .map(|key| {
                let collection = &mut graph.collections[key.index()];
                let prior = collection.tracking;
                collection.tracking = false;
                (key, prior)
            })
            .collect();
        Self { graph, saved }
    }
}

impl Deref for TrackingSuspension<'_> {
    type Target = EntityGraph;

    fn deref(&self) -> &EntityGraph {
        self.graph
    }
}

impl DerefMut for TrackingSuspension<'_> {
    fn deref_mut(&mut self) -> &mut EntityGraph {
        self.graph
    }
}

impl Drop for TrackingSuspension<'_> {
    fn drop(&mut self) {
        // Restore in reverse so a collection listed twice ends at its
        // original value.
        for (key, prior) in self.saved.drain(..).rev() {
            self.graph.collections[key.index()].tracking = prior;
        }
    }
}

impl EntityGraph {
    /// Suspends tracking on one collection until the guard drops.
    ///
    /// Only the collection's own flag changes; subscriptions stay in place,
    /// so notifications arriving meanwhile are simply ignored.
    pub fn suspend_tracking(&mut self, key: CollectionKey) -> TrackingResult<TrackingSuspension<'_>> {
        self.check_collection(key)?;
        Ok(TrackingSuspension::new(self, vec![key]))
    }

    /// Suspends tracking on every collection currently observing `entity`.
    pub fn suspend_observers(&mut self, entity: EntityKey) -> TrackingResult<TrackingSuspension<'_>> {
        let observers = self.entity(entity)?.observers.clone();
        Ok(TrackingSuspension::new(self, observers))
    }

    pub(crate) fn suspend_unchecked(&mut self, key: CollectionKey) -> TrackingSuspension<'_> {
        TrackingSuspension::new(self, vec![key])
    }
}
