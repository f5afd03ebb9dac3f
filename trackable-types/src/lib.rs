//! Core type definitions for trackable entity graphs.
//!
//! This crate defines the small, dependency-light vocabulary shared by the
//! schema and engine crates:
//! - [`EntityIdentifier`]: correlation key for matching entities across a round trip
//! - [`TrackingState`]: lifecycle phase of an entity relative to its baseline
//! - [`RelationshipKind`]: topology of a relationship property (1-1, 1-M, M-1, M-M)
//!
//! Business keys, entity payloads and the graph itself live elsewhere.

mod ids;
mod state;

pub use ids::EntityIdentifier;
pub use state::{RelationshipKind, TrackingState};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid entity identifier: {0}")]
    InvalidIdentifier(#[from] uuid::Error),

    #[error("nil UUID is not a valid entity identifier")]
    NilIdentifier,

    #[error("unknown tracking state: {0}")]
    UnknownTrackingState(String),

    #[error("unknown relationship kind: {0}")]
    UnknownRelationshipKind(String),
}
