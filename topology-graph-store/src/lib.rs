//! # Topology Graph Store
//!
//! This crate provides the storage seam for the topology loader: a
//! `GraphStore` trait, its error type, safe Cypher construction, and two
//! implementations (Neo4j and in-memory).

pub mod config;
pub mod cypher;
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod neo4j;
pub mod types;

pub use config::Neo4jConfig;
pub use cypher::CypherIdent;
pub use errors::GraphStoreError;
pub use interfaces::{GraphStore, GraphStoreConnector};
pub use memory::{FaultPlan, GraphSnapshot, MemoryConnector};
pub use neo4j::{Neo4jConnector, Neo4jGraphStore};
pub use types::{
    ConstraintKind, ConstraintSpec, Direction, EdgeBatchOutcome, EdgeMerge, IndexSpec,
    NeighborQuery, NodeBatchOutcome, NodeUpsert, PropertyMap, RelatedNode, UniquenessMode,
};
