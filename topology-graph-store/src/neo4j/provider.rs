//! Neo4j provider implementation.
//!
//! Every batch runs inside one explicit transaction: an `UNWIND` statement per
//! batch for nodes, and one per relationship type present in the batch for
//! edges. The transaction commits before the method returns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use neo4rs::{BoltType, ConfigBuilder, Graph, Query, Row, Txn};
use tracing::{debug, info, warn};

use crate::config::Neo4jConfig;
use crate::cypher::{self, CypherIdent, CONNECTIVITY_CHECK};
use crate::errors::GraphStoreError;
use crate::interfaces::{GraphStore, GraphStoreConnector};
use crate::types::{
    ConstraintSpec, EdgeBatchOutcome, EdgeMerge, IndexSpec, NeighborQuery, NodeBatchOutcome,
    NodeUpsert, RelatedNode, ASSET_ID_PROPERTY, INTERNAL_ASSET_ID_PROPERTY,
};

/// Opens [`Neo4jGraphStore`] sessions from a [`Neo4jConfig`].
#[derive(Debug, Clone)]
pub struct Neo4jConnector {
    config: Neo4jConfig,
}

impl Neo4jConnector {
    pub fn new(config: Neo4jConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl GraphStoreConnector for Neo4jConnector {
    async fn connect(&self) -> Result<Box<dyn GraphStore>, GraphStoreError> {
        let store = Neo4jGraphStore::connect(&self.config)?;
        Ok(Box::new(store))
    }
}

/// Graph store session backed by a `neo4rs` connection pool.
pub struct Neo4jGraphStore {
    graph: Graph,
    closed: AtomicBool,
}

impl Neo4jGraphStore {
    /// Build the connection pool. Connections are opened lazily, so callers
    /// should follow up with `verify_connectivity`.
    pub fn connect(config: &Neo4jConfig) -> Result<Self, GraphStoreError> {
        info!(uri = %config.uri, database = ?config.database, "Connecting to Neo4j");

        let mut builder = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .max_connections(config.max_connections);
        if let Some(database) = &config.database {
            builder = builder.db(database.as_str());
        }
        let neo4j_config = builder
            .build()
            .map_err(|e| GraphStoreError::connection(format!("Invalid Neo4j config: {}", e)))?;

        let graph = Graph::connect(neo4j_config)?;

        Ok(Self {
            graph,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), GraphStoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GraphStoreError::Closed);
        }
        Ok(())
    }

    /// Run all statements in one transaction and return every produced row.
    async fn run_in_transaction(&self, statements: Vec<Query>) -> Result<Vec<Row>, GraphStoreError> {
        let mut txn = self.graph.start_txn().await?;
        let mut rows = Vec::new();

        for statement in statements {
            match collect_rows(&mut txn, statement).await {
                Ok(mut produced) => rows.append(&mut produced),
                Err(e) => {
                    if let Err(rollback_err) = txn.rollback().await {
                        warn!(error = %rollback_err, "Failed to roll back batch transaction");
                    }
                    return Err(e);
                }
            }
        }

        txn.commit().await?;
        Ok(rows)
    }

    /// Run a schema statement in its own auto-commit transaction.
    async fn run_schema(&self, statement: String) -> Result<(), GraphStoreError> {
        debug!(statement = %statement, "Running schema statement");
        self.graph.run(Query::new(statement)).await?;
        Ok(())
    }
}

async fn collect_rows(txn: &mut Txn, statement: Query) -> Result<Vec<Row>, GraphStoreError> {
    let mut stream = txn.execute(statement).await?;
    let mut rows = Vec::new();
    while let Some(row) = stream.next(txn.handle()).await? {
        rows.push(row);
    }
    Ok(rows)
}

fn count_column(row: &Row, column: &str) -> Result<usize, GraphStoreError> {
    let value: i64 = row
        .get(column)
        .map_err(|e| GraphStoreError::decode(format!("column {}: {}", column, e)))?;
    usize::try_from(value)
        .map_err(|_| GraphStoreError::decode(format!("column {} is negative: {}", column, value)))
}

fn node_parameter(node: &NodeUpsert) -> HashMap<String, BoltType> {
    let labels: Vec<String> = node
        .secondary_label
        .iter()
        .map(|label| label.as_str().to_string())
        .collect();

    let mut row: HashMap<String, BoltType> = HashMap::new();
    row.insert(ASSET_ID_PROPERTY.to_string(), node.asset_id.clone().into());
    row.insert(
        INTERNAL_ASSET_ID_PROPERTY.to_string(),
        node.internal_asset_id.clone().into(),
    );
    row.insert("labels".to_string(), labels.into());
    row.insert("attributes".to_string(), node.attributes.clone().into());
    row
}

fn edge_parameter(edge: &EdgeMerge) -> HashMap<String, BoltType> {
    let mut row: HashMap<String, BoltType> = HashMap::new();
    row.insert("source".to_string(), edge.source_asset_id.clone().into());
    row.insert("target".to_string(), edge.target_asset_id.clone().into());
    row.insert("attributes".to_string(), edge.attributes.clone().into());
    row
}

/// Group edges by relationship type, keeping first-seen type order and input
/// order within each type.
fn group_by_type(edges: &[EdgeMerge]) -> Vec<(&CypherIdent, Vec<&EdgeMerge>)> {
    let mut groups: Vec<(&CypherIdent, Vec<&EdgeMerge>)> = Vec::new();
    let mut positions: HashMap<&CypherIdent, usize> = HashMap::new();

    for edge in edges {
        match positions.get(&edge.relationship_type) {
            Some(&idx) => groups[idx].1.push(edge),
            None => {
                positions.insert(&edge.relationship_type, groups.len());
                groups.push((&edge.relationship_type, vec![edge]));
            }
        }
    }

    groups
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn verify_connectivity(&self) -> Result<(), GraphStoreError> {
        self.ensure_open()?;
        let mut result = self.graph.execute(Query::new(CONNECTIVITY_CHECK.to_string())).await?;
        match result.next().await? {
            Some(row) => {
                let message: String = row
                    .get("message")
                    .map_err(|e| GraphStoreError::decode(e.to_string()))?;
                info!(message = %message, "Neo4j connectivity verified");
                Ok(())
            }
            None => Err(GraphStoreError::connection(
                "Connectivity check returned no rows",
            )),
        }
    }

    async fn ensure_constraint(&self, spec: &ConstraintSpec) -> Result<(), GraphStoreError> {
        self.ensure_open()?;
        self.run_schema(cypher::constraint_statement(spec))
            .await
            .map_err(|e| match e {
                GraphStoreError::QueryError(msg) => GraphStoreError::constraint_rejected(msg),
                other => other,
            })
    }

    async fn ensure_index(&self, spec: &IndexSpec) -> Result<(), GraphStoreError> {
        self.ensure_open()?;
        self.run_schema(cypher::index_statement(spec)).await
    }

    async fn upsert_nodes(
        &self,
        label: &CypherIdent,
        nodes: &[NodeUpsert],
        secondary_labels: bool,
    ) -> Result<NodeBatchOutcome, GraphStoreError> {
        self.ensure_open()?;
        if nodes.is_empty() {
            return Ok(NodeBatchOutcome::default());
        }

        let rows: Vec<HashMap<String, BoltType>> = nodes.iter().map(node_parameter).collect();
        let statement = Query::new(cypher::node_upsert_statement(label, secondary_labels))
            .param("rows", rows);

        let result = self.run_in_transaction(vec![statement]).await?;

        let mut outcome = NodeBatchOutcome::default();
        for row in &result {
            let created = count_column(row, "created")?;
            let upserted = count_column(row, "upserted")?;
            outcome.created += created;
            outcome.updated += upserted.saturating_sub(created);
        }
        debug!(
            created = outcome.created,
            updated = outcome.updated,
            "Committed node batch"
        );
        Ok(outcome)
    }

    async fn merge_edges(
        &self,
        label: &CypherIdent,
        edges: &[EdgeMerge],
    ) -> Result<EdgeBatchOutcome, GraphStoreError> {
        self.ensure_open()?;
        if edges.is_empty() {
            return Ok(EdgeBatchOutcome::default());
        }

        let statements: Vec<Query> = group_by_type(edges)
            .into_iter()
            .map(|(relationship_type, group)| {
                let rows: Vec<HashMap<String, BoltType>> =
                    group.into_iter().map(edge_parameter).collect();
                Query::new(cypher::edge_merge_statement(label, relationship_type))
                    .param("rows", rows)
            })
            .collect();

        let result = self.run_in_transaction(statements).await?;

        let mut merged = 0;
        for row in &result {
            merged += count_column(row, "merged")?;
        }
        let outcome = EdgeBatchOutcome {
            merged,
            unresolved: edges.len().saturating_sub(merged),
        };
        debug!(
            merged = outcome.merged,
            unresolved = outcome.unresolved,
            "Committed edge batch"
        );
        Ok(outcome)
    }

    async fn related_nodes(
        &self,
        query: &NeighborQuery,
    ) -> Result<Vec<RelatedNode>, GraphStoreError> {
        self.ensure_open()?;
        let statement = Query::new(cypher::related_nodes_statement(query))
            .param("assetId", query.asset_id.clone())
            .param("types", query.relationship_types.clone())
            .param("limit", query.limit as i64);

        let mut result = self.graph.execute(statement).await?;
        let mut related = Vec::new();
        while let Some(row) = result.next().await? {
            let depth: i64 = row
                .get("depth")
                .map_err(|e| GraphStoreError::decode(e.to_string()))?;
            related.push(RelatedNode {
                asset_id: row
                    .get("assetId")
                    .map_err(|e| GraphStoreError::decode(e.to_string()))?,
                depth: u32::try_from(depth)
                    .map_err(|_| GraphStoreError::decode(format!("invalid depth {}", depth)))?,
                relationship_type: row
                    .get("relationshipType")
                    .map_err(|e| GraphStoreError::decode(e.to_string()))?,
                properties: row
                    .get("properties")
                    .map_err(|e| GraphStoreError::decode(e.to_string()))?,
            });
        }
        Ok(related)
    }

    async fn close(&self) -> Result<(), GraphStoreError> {
        // The pool is released when the store is dropped.
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Closed Neo4j session");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(source: &str, target: &str, rel: &str) -> EdgeMerge {
        EdgeMerge {
            source_asset_id: source.to_string(),
            target_asset_id: target.to_string(),
            relationship_type: CypherIdent::new(rel).unwrap(),
            attributes: HashMap::new(),
        }
    }

    #[test]
    fn test_group_by_type_keeps_order() {
        let edges = vec![
            edge("D1", "D2", "CONNECTS_TO"),
            edge("D2", "D3", "HOSTS"),
            edge("D1", "D3", "CONNECTS_TO"),
        ];
        let groups = group_by_type(&edges);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.as_str(), "CONNECTS_TO");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[0].1[1].target_asset_id, "D3");
        assert_eq!(groups[1].0.as_str(), "HOSTS");
    }
}
