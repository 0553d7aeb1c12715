use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use topology_graph_store::types::ASSET_ID_PROPERTY;
use topology_graph_store::{CypherIdent, GraphStore, NodeUpsert};

use crate::cancellation::CancellationHandle;
use crate::errors::LoaderError;
use crate::mapping::{FieldMapper, TYPE_ATTRIBUTE};
use crate::source::{RawRow, RowSource};

use super::LoadOutcome;

/// Running counts for a node load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLoadSummary {
    /// Rows merged into a node, created or updated.
    pub nodes_processed: usize,
    pub nodes_created: usize,
    pub nodes_updated: usize,
    /// Rows without an asset identifier, plus undecodable records.
    pub rows_rejected: usize,
    pub batches_committed: usize,
}

/// Upserts one node per asset identifier.
pub struct NodeLoader {
    label: CypherIdent,
    mapper: FieldMapper,
    batch_size: usize,
    secondary_labels: bool,
    summary: NodeLoadSummary,
}

impl NodeLoader {
    pub fn new(label: CypherIdent, mapper: FieldMapper, batch_size: usize) -> Self {
        Self {
            label,
            mapper,
            batch_size,
            secondary_labels: false,
            summary: NodeLoadSummary::default(),
        }
    }

    pub fn with_secondary_labels(mut self, enabled: bool) -> Self {
        self.secondary_labels = enabled;
        self
    }

    pub fn summary(&self) -> NodeLoadSummary {
        self.summary
    }

    /// Load every device row from `source`.
    ///
    /// Batches commit independently; an error leaves earlier batches in the
    /// store and the counts so far in `summary()`.
    #[instrument(skip_all, fields(label = %self.label.as_str()))]
    pub async fn load(
        &mut self,
        store: &dyn GraphStore,
        source: RowSource,
        cancel: &CancellationHandle,
    ) -> Result<LoadOutcome, LoaderError> {
        let mut batches = source.into_batches(self.batch_size);

        loop {
            if cancel.is_cancelled() {
                info!(
                    batches_committed = self.summary.batches_committed,
                    "Node load cancelled"
                );
                return Ok(LoadOutcome::Cancelled);
            }

            let Some(batch) = batches.next().await else {
                break;
            };
            let batch = batch?;

            self.summary.rows_rejected += batch.malformed;
            let mut upserts = Vec::with_capacity(batch.rows.len());
            for row in &batch.rows {
                match self.to_upsert(row) {
                    Some(upsert) => upserts.push(upsert),
                    None => {
                        debug!(batch = batch.index, "Rejected device row without asset identifier");
                        self.summary.rows_rejected += 1;
                    }
                }
            }
            if upserts.is_empty() {
                continue;
            }

            let outcome = store
                .upsert_nodes(&self.label, &upserts, self.secondary_labels)
                .await?;

            self.summary.nodes_processed += outcome.upserted();
            self.summary.nodes_created += outcome.created;
            self.summary.nodes_updated += outcome.updated;
            self.summary.batches_committed += 1;
            info!(
                batch = batch.index,
                created = outcome.created,
                updated = outcome.updated,
                nodes_processed = self.summary.nodes_processed,
                "Committed node batch"
            );
        }

        Ok(LoadOutcome::Completed)
    }

    fn to_upsert(&self, row: &RawRow) -> Option<NodeUpsert> {
        let mut attributes = self.mapper.map(row);
        let asset_id = attributes
            .get(ASSET_ID_PROPERTY)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())?;
        attributes.insert(ASSET_ID_PROPERTY.to_string(), asset_id.clone());

        let secondary_label = attributes
            .get(TYPE_ATTRIBUTE)
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .and_then(|t| match CypherIdent::new(t) {
                Ok(label) => Some(label),
                Err(e) => {
                    warn!(asset_id = %asset_id, error = %e, "Ignoring unusable device type label");
                    None
                }
            });

        Some(NodeUpsert {
            asset_id,
            internal_asset_id: Uuid::new_v4().to_string(),
            secondary_label,
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topology_graph_store::{FaultPlan, GraphStoreConnector, MemoryConnector};

    fn label() -> CypherIdent {
        CypherIdent::new("CI").unwrap()
    }

    fn device(id: &str, kind: &str) -> RawRow {
        let mut row = RawRow::new();
        row.insert("Asset ID".to_string(), id.to_string());
        row.insert("Type".to_string(), kind.to_string());
        row
    }

    #[tokio::test]
    async fn test_rows_without_identity_are_rejected() {
        let connector = MemoryConnector::new();
        let store = connector.connect().await.unwrap();
        let mut loader = NodeLoader::new(label(), FieldMapper::device_topology(), 2);

        let rows = vec![device("D1", "Router"), device("  ", "Switch"), device(" D2 ", "")];
        let outcome = loader
            .load(store.as_ref(), RowSource::Rows(rows), &CancellationHandle::new())
            .await
            .unwrap();

        assert_eq!(outcome, LoadOutcome::Completed);
        let summary = loader.summary();
        assert_eq!(summary.nodes_processed, 2);
        assert_eq!(summary.nodes_created, 2);
        assert_eq!(summary.rows_rejected, 1);
        assert_eq!(summary.batches_committed, 2);

        let snapshot = connector.snapshot().await;
        assert!(snapshot.node("CI", "D2").is_some());
        assert_eq!(snapshot.node("CI", "D2").unwrap().properties["assetId"], "D2");
    }

    #[tokio::test]
    async fn test_secondary_label_from_type() {
        let connector = MemoryConnector::new();
        let store = connector.connect().await.unwrap();
        let mut loader =
            NodeLoader::new(label(), FieldMapper::device_topology(), 10).with_secondary_labels(true);

        loader
            .load(
                store.as_ref(),
                RowSource::Rows(vec![device("D1", "Load Balancer")]),
                &CancellationHandle::new(),
            )
            .await
            .unwrap();

        let snapshot = connector.snapshot().await;
        assert!(snapshot
            .node("CI", "D1")
            .unwrap()
            .labels
            .contains("Load Balancer"));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_batch() {
        let connector = MemoryConnector::new();
        let store = connector.connect().await.unwrap();
        let mut loader = NodeLoader::new(label(), FieldMapper::device_topology(), 1);
        let cancel = CancellationHandle::new();
        cancel.cancel();

        let outcome = loader
            .load(store.as_ref(), RowSource::Rows(vec![device("D1", "")]), &cancel)
            .await
            .unwrap();

        assert_eq!(outcome, LoadOutcome::Cancelled);
        assert_eq!(connector.snapshot().await.node_count("CI"), 0);
    }

    #[tokio::test]
    async fn test_store_failure_keeps_counts() {
        let connector = MemoryConnector::with_faults(FaultPlan {
            fail_after_batches: Some(1),
            ..FaultPlan::default()
        });
        let store = connector.connect().await.unwrap();
        let mut loader = NodeLoader::new(label(), FieldMapper::device_topology(), 1);

        let result = loader
            .load(
                store.as_ref(),
                RowSource::Rows(vec![device("D1", ""), device("D2", "")]),
                &CancellationHandle::new(),
            )
            .await;

        assert!(matches!(result, Err(LoaderError::Store(_))));
        assert_eq!(loader.summary().nodes_processed, 1);
        assert_eq!(connector.snapshot().await.node_count("CI"), 1);
    }
}
