//! Error types for the tracking engine.

use crate::{CollectionKey, EntityKey};
use thiserror::Error;
use trackable_model::SchemaError;

/// Result type for tracking operations.
pub type TrackingResult<T> = Result<T, TrackingError>;

/// Errors that can occur while tracking or traversing an entity graph.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// No schema is registered for the type.
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Key does not belong to this graph.
    #[error("unknown entity: {0}")]
    UnknownEntity(EntityKey),

    /// Key does not belong to this graph.
    #[error("unknown collection: {0}")]
    UnknownCollection(CollectionKey),

    /// The schema declares no relation with this name.
    #[error("{entity_type} has no relation named {property}")]
    UnknownProperty {
        entity_type: String,
        property: String,
    },

    /// A collection relation was used where a reference was expected.
    #[error("{entity_type}.{property} is not a reference property")]
    NotAReference {
        entity_type: String,
        property: String,
    },

    /// A reference relation was used where a collection was expected.
    #[error("{entity_type}.{property} is not a collection property")]
    NotACollection {
        entity_type: String,
        property: String,
    },

    /// Tracking metadata or a relation name used as a scalar property.
    #[error("{0} cannot be written as a scalar property")]
    ReservedProperty(String),

    /// Entity values must be a JSON object.
    #[error("invalid entity values: {0}")]
    InvalidValues(String),

    /// An entity of the wrong type was offered to a collection or reference.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("index {index} out of bounds for collection of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Reference trackers hold exactly one entity and are driven by
    /// reference assignment.
    #[error("collection {0} is a reference tracker; assign the reference instead")]
    ReferenceSlot(CollectionKey),

    /// Merge correlation requested on a type without usable identity.
    #[error("entity type {0} is not equatable and cannot be merged")]
    NotEquatable(String),

    /// Schema validation failed.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A deserialized graph refers to keys or types it does not contain.
    #[error("invalid graph document: {0}")]
    InvalidDocument(String),
}
