//! Neo4j implementation of the graph store, built on `neo4rs`.

mod provider;

pub use provider::{Neo4jConnector, Neo4jGraphStore};
