//! Object-graph mapping for labeled-property graph stores.
//!
//! Saves and loads annotated domain types through a [`GraphStore`].
//!
//! # Examples
//!
//! ```
//! use graphmodel::{GraphEntity, GraphSession, InMemoryGraphStore, Ref};
//!
//! #[derive(Debug, Default, GraphEntity)]
//! #[graph(node)]
//! struct Person {
//!     #[graph(id(generated))]
//!     id: Option<i64>,
//!     #[graph(version)]
//!     version: Option<i64>,
//!     name: String,
//!     #[graph(relationship(type = "KNOWS"))]
//!     knows: Vec<Ref<Person>>,
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> graphmodel::Result<()> {
//! let session = GraphSession::new(InMemoryGraphStore::new());
//!
//! let ada = Ref::new(Person { name: "Ada".into(), ..Default::default() });
//! let bob = Ref::new(Person { name: "Bob".into(), ..Default::default() });
//! ada.write()?.knows.push(bob.clone());
//! bob.write()?.knows.push(ada.clone());
//!
//! session.save(&ada).await?;
//! let id = ada.read()?.id.expect("generated on insert");
//! assert_eq!(ada.read()?.version, Some(0));
//!
//! let loaded = session.load::<Person>(id).await?.expect("stored");
//! let friend = loaded.read()?.knows[0].clone();
//! assert_eq!(friend.read()?.name, "Bob");
//! assert!(friend.read()?.knows[0].ptr_eq(&loaded));
//! # Ok(())
//! # }
//! ```

// ============================================================================
// graphmodel Library
// ============================================================================

// Lets `#[derive(GraphEntity)]` output (which names `::graphmodel`) compile
// inside this crate's own tests.
extern crate self as graphmodel;

pub mod config;
pub mod core;
pub mod mapping;
pub mod session;
pub mod store;

pub use config::{MappingConfig, MappingMode};
pub use core::{ErrorKind, GraphId, OgmError, PropertyKind, Result, Value};

// Re-export the mapping API
pub use mapping::{
    Cardinality, EdgeType, EntityKind, EntityRef, GraphEntity, GraphSchema, GraphType,
    IdentifierStrategy, Materializer, MetadataRegistry, PropertyValue, Ref, RelationshipDescriptor,
    RelationshipField, RelationshipValue, SchemaBuilder, Serializer, TypeDescriptor, WriteDecision,
    WriteOperation, WriteSet,
};
pub use store::{
    EdgeUpsert, GraphRecord, GraphStore, InMemoryGraphStore, NodeRef, NodeUpsert, RawEdge, RawNode,
};

// ============================================================================
// Session API
// ============================================================================

pub use session::GraphSession;

pub use graphmodel_derive::GraphEntity;
