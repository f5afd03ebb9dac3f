//! Relationship schema for trackable entity graphs.
//!
//! Defines the statically declared description of every entity type the
//! tracking engine handles:
//! - [`Relation`]: one relationship property (name, kind, related type)
//! - [`EntitySchema`]: the relationship properties of one entity type
//! - [`SchemaRegistry`]: all registered types, validated as a whole
//!
//! The engine never inspects entity values to discover relationships; every
//! recursive algorithm is driven by these descriptors.

mod registry;
mod schema;

pub use registry::{SchemaError, SchemaRegistry, SchemaResult};
pub use schema::{EntitySchema, Relation};
pub use trackable_types::RelationshipKind;
