//! Imbi Graph: Neo4j persistence for the Imbi domain model.
//!
//! This crate owns the connection pool and is the only place Cypher is
//! built. Nodes are addressed by the natural key their entity descriptor
//! declares; relationships by type name plus both endpoint keys.

pub mod client;
pub mod nodes;
mod paging;
pub mod props;
pub mod relationships;
pub mod schema;

pub use client::{GraphClient, GraphError, GraphHandle};
pub use nodes::{Matcher, OrderBy, SortOrder};
pub use relationships::{Direction, NodeRef, Related, Relationship};
pub use schema::Declaration;
