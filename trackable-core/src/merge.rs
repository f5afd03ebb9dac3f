//! Folding server-returned entities back into the tracked graph.
//!
//! The updated entities live in a separate [`EntityGraph`], usually a
//! [`ChangeSet`] after a service round trip. Both graphs are walked in
//! parallel: updated entities are matched to originals by entity identifier,
//! their scalar values are copied onto the originals with tracking suspended,
//! and the originals are accepted. Originals are updated in place, so every
//! key held by the caller stays valid and unmatched originals stay where they
//! are.

use crate::graph::{check_scalar_property, relation_error, schema_for};
use crate::{
    ChangeSet, CollectionKey, EntityGraph, EntityKey, TrackingError, TrackingResult,
    VisitationGuard,
};
use tracing::{debug, trace, warn};

/// Bookkeeping for one merge call.
#[derive(Default)]
struct MergeContext {
    /// Source entities already merged.
    visited: VisitationGuard,
    /// Originals that received values, in merge order.
    merged: Vec<EntityKey>,
}

impl EntityGraph {
    /// Merges `updated` entities of `source` into the collection `key`.
    ///
    /// For every updated entity the matching original is found (by entity
    /// identifier among live items and cached deletes; a reference tracker's
    /// single item matches unconditionally and exchanges identifiers). Its
    /// assigned references and non-empty collections are merged recursively,
    /// its scalar values are copied, and the original with its reachable
    /// graph is accepted. Deleted-items caches of the merged collections are
    /// cleared.
    ///
    /// Reference properties that are `None` in the source leave the original
    /// reference alone. Updated entities without a match are skipped.
    ///
    /// An empty `updated` is a no-op. Merging a type that is not equatable
    /// fails with [`TrackingError::NotEquatable`] before anything changes.
    pub fn merge_changes(
        &mut self,
        key: CollectionKey,
        source: &mut EntityGraph,
        updated: &[EntityKey],
    ) -> TrackingResult<()> {
        self.check_collection(key)?;
        if updated.is_empty() {
            return Ok(());
        }
        self.check_mergeable(key, source, updated)?;

        debug!("Merging {} updated items into {}", updated.len(), key);
        let mut context = MergeContext::default();
        self.merge_into(key, source, updated, &mut context)?;

        let mut accepted = VisitationGuard::new();
        for original in &context.merged {
            self.accept_changes_inner(*original, &mut accepted);
        }
        debug!("Merged {} entities into {}", context.merged.len(), key);
        Ok(())
    }

    /// Merges every root item of a change set.
    pub fn merge_change_set(&mut self, key: CollectionKey, changes: &mut ChangeSet) -> TrackingResult<()> {
        let updated = changes.items().to_vec();
        self.merge_changes(key, changes.graph_mut(), &updated)
    }

    /// Rejects a merge that would have to correlate entities without
    /// identity, or whose source does not fit this graph's schemas: every
    /// scalar, reference and collection of the source closure is checked
    /// up front, so values are only ever written to scalar properties.
    fn check_mergeable(
        &self,
        key: CollectionKey,
        source: &EntityGraph,
        updated: &[EntityKey],
    ) -> TrackingResult<()> {
        let collection = &self.collections[key.index()];
        for item in updated {
            check_related_type(&collection.entity_type, &source.entity(*item)?.entity_type)?;
        }
        if !collection.is_reference_tracker() {
            self.check_equatable(&collection.entity_type)?;
        }

        let mut guard = VisitationGuard::new();
        let mut pending = updated.to_vec();
        while let Some(entity) = pending.pop() {
            if !guard.visit_entity(entity) {
                continue;
            }
            let node = source.entity(entity)?;
            let schema = schema_for(&self.schemas, &node.entity_type)?;
            for property in node.values.keys() {
                check_scalar_property(schema, property)?;
            }
            for (property, tracker) in &node.references {
                let Some(target) = tracker.entity(source) else { continue };
                let relation = schema
                    .relation(property)
                    .filter(|r| r.kind.is_reference())
                    .ok_or_else(|| relation_error(schema, property))?;
                check_related_type(&relation.related_type, &source.entity(target)?.entity_type)?;
                pending.push(target);
            }
            for (property, nested) in &node.collections {
                let nested = source.tracking_collection(*nested)?;
                if nested.items.is_empty() {
                    continue;
                }
                let relation = schema
                    .relation(property)
                    .filter(|r| r.kind.is_collection())
                    .ok_or_else(|| relation_error(schema, property))?;
                check_related_type(&relation.related_type, &nested.entity_type)?;
                self.check_equatable(&nested.entity_type)?;
                for item in &nested.items {
                    check_related_type(&relation.related_type, &source.entity(*item)?.entity_type)?;
                }
                pending.extend(nested.items.iter().copied());
            }
        }
        Ok(())
    }

    fn check_equatable(&self, entity_type: &str) -> TrackingResult<()> {
        if schema_for(&self.schemas, entity_type)?.equatable {
            Ok(())
        } else {
            Err(TrackingError::NotEquatable(entity_type.to_string()))
        }
    }

    fn merge_into(
        &mut self,
        key: CollectionKey,
        source: &mut EntityGraph,
        updated: &[EntityKey],
        context: &mut MergeContext,
    ) -> TrackingResult<()> {
        let mut merged = Vec::new();
        for item in updated {
            if !context.visited.visit_entity(*item) {
                continue;
            }
            let Some(original) = self.correlate(key, source, *item) else {
                warn!("No original in {} matches updated {}; skipping", key, item);
                continue;
            };
            self.merge_entity(original, source, *item, context)?;
            merged.push(original);
        }

        let collection = &mut self.collections[key.index()];
        collection.deleted.clear();
        let live = &collection.items;
        collection
            .relation_states
            .retain(|member, _| live.contains(member) && !merged.contains(member));
        Ok(())
    }

    /// Finds the original an updated entity corresponds to.
    fn correlate(&mut self, key: CollectionKey, source: &mut EntityGraph, item: EntityKey) -> Option<EntityKey> {
        let collection = &self.collections[key.index()];
        if collection.is_reference_tracker() {
            let original = collection.items.first().copied()?;
            let identifier = self.assign_identifier(original);
            let updated = &mut source.entities[item.index()];
            if updated.entity_identifier.is_none() {
                updated.entity_identifier = identifier;
            }
            return Some(original);
        }

        let identifier = source.entities[item.index()].entity_identifier?;
        collection
            .items
            .iter()
            .chain(collection.deleted.iter())
            .copied()
            .find(|candidate| self.entities[candidate.index()].entity_identifier == Some(identifier))
    }

    fn merge_entity(
        &mut self,
        original: EntityKey,
        source: &mut EntityGraph,
        item: EntityKey,
        context: &mut MergeContext,
    ) -> TrackingResult<()> {
        trace!("Merging updated {} into {}", item, original);

        let view: &EntityGraph = source;
        let node = &view.entities[item.index()];
        let references: Vec<_> = node
            .references
            .iter()
            .filter_map(|(property, tracker)| tracker.entity(view).map(|target| (property.clone(), target)))
            .collect();
        let collections: Vec<_> = node
            .collections
            .iter()
            .map(|(property, collection)| (property.clone(), *collection))
            .collect();
        let values = node.values.clone();

        for (property, target) in references {
            match self.entities[original.index()].references.get(&property).copied() {
                Some(tracker) => self.merge_into(tracker.collection(), source, &[target], context)?,
                None => trace!("{}.{} is unassigned on the original", original, property),
            }
        }

        for (property, collection) in collections {
            let children = source.collections[collection.index()].items.clone();
            if children.is_empty() {
                continue;
            }
            if let Some(target) = self.entities[original.index()].collections.get(&property).copied() {
                self.merge_into(target, source, &children, context)?;
            }
        }

        let mut graph = self.suspend_observers(original)?;
        for (property, value) in values {
            graph.write_value(original, &property, value);
        }
        drop(graph);

        context.merged.push(original);
        Ok(())
    }
}

fn check_related_type(expected: &str, found: &str) -> TrackingResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(TrackingError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }
}
