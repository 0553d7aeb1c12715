//! Interface definitions for the graph store.
//!
//! This module defines the abstract `GraphStore` and `GraphStoreConnector`
//! traits that allow the loader to run against Neo4j or the in-memory store.

mod graph_store;

pub use graph_store::{GraphStore, GraphStoreConnector};
