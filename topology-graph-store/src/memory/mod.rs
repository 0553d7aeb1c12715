//! In-memory implementation of the graph store.
//!
//! Used by the `memory` backend and by tests that need to inspect the graph
//! or inject store failures.

mod provider;

pub use provider::{
    EdgeKey, FaultPlan, GraphSnapshot, InMemoryGraphStore, MemoryConnector, MemoryNode,
};
