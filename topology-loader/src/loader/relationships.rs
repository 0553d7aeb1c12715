use serde::Serialize;
use tracing::{debug, info, instrument};

use topology_graph_store::{CypherIdent, EdgeMerge, GraphStore, PropertyMap};

use crate::cancellation::CancellationHandle;
use crate::errors::LoaderError;
use crate::source::{RawRow, RowSource};

use super::LoadOutcome;

pub const SOURCE_ASSET_COLUMN: &str = "Source Asset ID";
pub const TARGET_ASSET_COLUMN: &str = "Target Asset ID";
pub const RELATIONSHIP_TYPE_COLUMN: &str = "Relationship Type Name";

const STRUCTURAL_COLUMNS: [&str; 3] = [
    SOURCE_ASSET_COLUMN,
    TARGET_ASSET_COLUMN,
    RELATIONSHIP_TYPE_COLUMN,
];

/// Running counts for a relationship load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipLoadSummary {
    /// Rows that created or refreshed an edge.
    pub edges_processed: usize,
    /// Every row that wrote nothing, for any reason below.
    pub edges_skipped: usize,
    /// Rows whose source or target node does not exist.
    pub unresolved_endpoints: usize,
    /// Rows missing an endpoint or carrying an unusable type name, plus
    /// undecodable records.
    pub invalid_rows: usize,
    pub batches_committed: usize,
}

/// Merges typed edges between nodes that already exist.
pub struct RelationshipLoader {
    label: CypherIdent,
    batch_size: usize,
    summary: RelationshipLoadSummary,
}

impl RelationshipLoader {
    pub fn new(label: CypherIdent, batch_size: usize) -> Self {
        Self {
            label,
            batch_size,
            summary: RelationshipLoadSummary::default(),
        }
    }

    pub fn summary(&self) -> RelationshipLoadSummary {
        self.summary
    }

    /// Load every relationship row from `source`.
    ///
    /// Dangling references and unusable rows are counted, never fatal.
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
                    "Relationship load cancelled"
                );
                return Ok(LoadOutcome::Cancelled);
            }

            let Some(batch) = batches.next().await else {
                break;
            };
            let batch = batch?;

            let mut invalid = batch.malformed;
            let mut edges = Vec::with_capacity(batch.rows.len());
            for row in &batch.rows {
                match to_edge(row) {
                    Ok(edge) => edges.push(edge),
                    Err(reason) => {
                        debug!(batch = batch.index, reason, "Skipped relationship row");
                        invalid += 1;
                    }
                }
            }
            self.summary.invalid_rows += invalid;
            self.summary.edges_skipped += invalid;
            if edges.is_empty() {
                continue;
            }

            let outcome = store.merge_edges(&self.label, &edges).await?;

            self.summary.edges_processed += outcome.merged;
            self.summary.unresolved_endpoints += outcome.unresolved;
            self.summary.edges_skipped += outcome.unresolved;
            self.summary.batches_committed += 1;
            info!(
                batch = batch.index,
                merged = outcome.merged,
                unresolved = outcome.unresolved,
                edges_processed = self.summary.edges_processed,
                "Committed relationship batch"
            );
        }

        Ok(LoadOutcome::Completed)
    }
}

fn required<'a>(row: &'a RawRow, column: &'static str) -> Result<&'a str, &'static str> {
    row.get(column)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or(column)
}

fn to_edge(row: &RawRow) -> Result<EdgeMerge, &'static str> {
    let source = required(row, SOURCE_ASSET_COLUMN)?;
    let target = required(row, TARGET_ASSET_COLUMN)?;
    let relationship_type = CypherIdent::new(required(row, RELATIONSHIP_TYPE_COLUMN)?)
        .map_err(|_| "unusable relationship type")?;

    let attributes: PropertyMap = row
        .iter()
        .filter(|(column, _)| {
            !column.trim().is_empty() && !STRUCTURAL_COLUMNS.contains(&column.as_str())
        })
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect();

    Ok(EdgeMerge {
        source_asset_id: source.to_string(),
        target_asset_id: target.to_string(),
        relationship_type,
        attributes,
    })
}
