// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # ontograph
//!
//! An ontology repository layered on a property graph. Concepts,
//! relationship types and typed properties are stored as graph vertices
//! linked by is-a, has-edge and has-property edges, and read back through
//! time-expiring caches.
//!
//! ## Architecture
//!
//! - **Graph substrate** (`graph`): string-addressed vertices and edges with
//!   multi-valued properties, over `petgraph`
//! - **Durable tier** (`store`): redb tables written on every flush
//! - **Ontology** (`ontology`): codec, hierarchy, property catalog, type
//!   resolution, caches, document import and the repository facade
//! - **Configuration** (`config`): TOML repository settings
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ontograph::graph::MemoryGraph;
//! use ontograph::ontology::{ENTITY_CONCEPT_IRI, PropertyType};
//! use ontograph::ontology::catalog::NewProperty;
//! use ontograph::{OntologyRepository, RepositoryConfig};
//!
//! let repo = OntologyRepository::open(Arc::new(MemoryGraph::new()), RepositoryConfig::in_memory()).unwrap();
//! repo.get_or_create_concept(Some(ENTITY_CONCEPT_IRI), "http://example.org#Person", Some("Person")).unwrap();
//! repo.add_property_to(
//!     &NewProperty::new("http://example.org#age", PropertyType::Integer)
//!         .on_concept("http://example.org#Person"),
//! ).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod ontology;
pub mod store;

pub use config::RepositoryConfig;
pub use error::{OntoError, OntoResult};
pub use ontology::OntologyRepository;
