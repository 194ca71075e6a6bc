//! Object-graph mapping core.
//!
//! Descriptors are built by the [`MetadataRegistry`] from the declarations a
//! type makes through [`GraphSchema::declare`]. The [`Serializer`] and the
//! [`Materializer`] walk instances and records with those descriptors, using
//! [`identity`] for insert/update decisions and [`relationships`] for the
//! four relationship shapes.

pub mod descriptor;
pub mod entity;
pub mod fields;
pub mod identity;
pub mod materializer;
pub mod registry;
pub mod relationships;
pub mod schema;
pub mod serializer;
pub mod values;

pub use descriptor::{
    Cardinality, EdgeType, IdentifierDescriptor, IdentifierStrategy, PropertyDescriptor,
    RelationshipDescriptor, TargetNodeDescriptor, TargetRef, TypeDescriptor,
};
pub use entity::{EntityKind, EntityRef, GraphEntity, GraphSchema, GraphType, Ref};
pub use fields::{RelationshipField, RelationshipValue};
pub use identity::{WriteDecision, WriteOperation, resolve_for_write};
pub use materializer::Materializer;
pub use registry::MetadataRegistry;
pub use relationships::{EdgeClaims, RelationshipTuple};
pub use schema::SchemaBuilder;
pub use serializer::{Serializer, WriteSet};
pub use values::{PropertyValue, in_field};
