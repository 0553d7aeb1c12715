//! Graph store trait definitions.
//!
//! This module defines the abstract interface the loader writes through,
//! allowing different backends (Neo4j, in-memory) to be swapped in.

use async_trait::async_trait;

use crate::cypher::CypherIdent;
use crate::errors::GraphStoreError;
use crate::types::{
    ConstraintSpec, EdgeBatchOutcome, EdgeMerge, IndexSpec, NeighborQuery, NodeBatchOutcome,
    NodeUpsert, RelatedNode,
};

/// One open session against a property-graph store.
///
/// Each batch method applies its whole slice in a single transaction and
/// commits before returning. A failed batch leaves earlier batches in place.
/// Implementations must be idempotent per batch: re-applying the same batch
/// converges to the same graph.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Run a trivial statement to prove the session can reach the store.
    async fn verify_connectivity(&self) -> Result<(), GraphStoreError>;

    /// Declare a uniqueness constraint if it does not already exist.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the constraint is in place
    /// * `Err(GraphStoreError::ConstraintRejected)` - If existing data violates it
    async fn ensure_constraint(&self, spec: &ConstraintSpec) -> Result<(), GraphStoreError>;

    /// Declare a node property index if it does not already exist.
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<(), GraphStoreError>;

    /// Merge a batch of nodes by `assetId` under `label`.
    ///
    /// Attributes are overwritten on every merge; `internal_asset_id` is only
    /// written when the node is created.
    async fn upsert_nodes(
        &self,
        label: &CypherIdent,
        nodes: &[NodeUpsert],
        secondary_labels: bool,
    ) -> Result<NodeBatchOutcome, GraphStoreError>;

    /// Merge a batch of edges between existing nodes under `label`.
    ///
    /// Rows with a missing endpoint are counted as unresolved and write nothing.
    /// Rows sharing (source, target, type) converge on one edge carrying the
    /// attributes of the last such row.
    async fn merge_edges(
        &self,
        label: &CypherIdent,
        edges: &[EdgeMerge],
    ) -> Result<EdgeBatchOutcome, GraphStoreError>;

    /// Nodes reachable from one asset.
    async fn related_nodes(&self, query: &NeighborQuery)
        -> Result<Vec<RelatedNode>, GraphStoreError>;

    /// Release the session. Further calls return `GraphStoreError::Closed`.
    async fn close(&self) -> Result<(), GraphStoreError>;
}

/// Opens store sessions.
///
/// The orchestrator calls `connect` once per run and closes the session it
/// receives on every exit path.
#[async_trait]
pub trait GraphStoreConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn GraphStore>, GraphStoreError>;
}
