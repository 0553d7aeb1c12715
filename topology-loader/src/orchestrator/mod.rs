//! Orchestrator for an import run.
//!
//! Sequences constraint preparation, the node load and the relationship load
//! against one store session, and turns the outcome into an [`ImportResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use topology_graph_store::{GraphStore, GraphStoreConnector};

use crate::cancellation::CancellationHandle;
use crate::config::LoaderConfig;
use crate::constraints::ConstraintManager;
use crate::errors::{ConfigError, LoaderError};
use crate::loader::{
    LoadOutcome, NodeLoadSummary, NodeLoader, RelationshipLoadSummary, RelationshipLoader,
};
use crate::source::RowSource;

/// Status code reported for a complete import.
pub const STATUS_OK: u16 = 200;
/// Status code reported for a failed import.
pub const STATUS_FAILED: u16 = 500;
/// Status code reported for a cancelled import.
pub const STATUS_CANCELLED: u16 = 499;

/// Progress of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoaderState {
    Idle,
    ConstraintsEnsured,
    NodesLoaded,
    RelationshipsLoaded,
    Complete,
    Failed,
    Cancelled,
}

/// Final status of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportStatus {
    Complete,
    Failed,
    Cancelled,
}

impl ImportStatus {
    pub fn code(&self) -> u16 {
        match self {
            ImportStatus::Complete => STATUS_OK,
            ImportStatus::Failed => STATUS_FAILED,
            ImportStatus::Cancelled => STATUS_CANCELLED,
        }
    }
}

/// Wall-clock time per phase, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTimings {
    pub constraints_ms: u64,
    pub nodes_ms: u64,
    pub relationships_ms: u64,
}

/// Outcome of an import run. Counts are filled in on every path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub status: ImportStatus,
    pub status_code: u16,
    pub status_message: String,
    /// Last non-terminal state reached before the run ended.
    pub last_state: LoaderState,
    pub nodes_processed: usize,
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub rows_rejected: usize,
    pub edges_processed: usize,
    pub edges_skipped: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub timings: PhaseTimings,
}

impl ImportResult {
    pub fn is_complete(&self) -> bool {
        self.status == ImportStatus::Complete
    }
}

/// Per-run accumulator shared by the phases.
#[derive(Debug, Default)]
struct RunProgress {
    nodes: NodeLoadSummary,
    relationships: RelationshipLoadSummary,
    timings: PhaseTimings,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Coordinates one import at a time over a store connector.
pub struct LoaderOrchestrator {
    connector: Arc<dyn GraphStoreConnector>,
    config: LoaderConfig,
    constraints: ConstraintManager,
    cancel: CancellationHandle,
    state: LoaderState,
}

impl LoaderOrchestrator {
    /// Create an orchestrator. The configuration is validated here, once.
    pub fn new(
        connector: Arc<dyn GraphStoreConnector>,
        config: LoaderConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let constraints = ConstraintManager::from_config(&config);
        Ok(Self {
            connector,
            config,
            constraints,
            cancel: CancellationHandle::new(),
            state: LoaderState::Idle,
        })
    }

    /// Use an existing handle, e.g. one shared with a signal listener.
    pub fn with_cancellation(mut self, cancel: CancellationHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that cancels the current or next run at a batch boundary.
    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    /// Run a full import.
    ///
    /// The store session is closed on every path once it has been opened.
    #[instrument(skip_all, fields(label = %self.config.node_label.as_str()))]
    pub async fn run(&mut self, devices: RowSource, relationships: RowSource) -> ImportResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut progress = RunProgress::default();
        self.state = LoaderState::Idle;

        info!(
            batch_size = self.config.batch_size,
            uniqueness = ?self.config.uniqueness,
            "Starting topology import"
        );

        let outcome = match self.connector.connect().await {
            Ok(store) => {
                let outcome = self
                    .run_phases(store.as_ref(), devices, relationships, &mut progress)
                    .await;
                if let Err(e) = store.close().await {
                    warn!(error = %e, "Failed to close graph store session");
                }
                outcome
            }
            Err(e) => Err(e.into()),
        };

        let last_state = self.state;
        let (status, status_message) = match outcome {
            Ok(LoadOutcome::Completed) => {
                self.state = LoaderState::Complete;
                (
                    ImportStatus::Complete,
                    format!(
                        "Imported {} nodes and {} edges",
                        progress.nodes.nodes_processed, progress.relationships.edges_processed
                    ),
                )
            }
            Ok(LoadOutcome::Cancelled) => {
                self.state = LoaderState::Cancelled;
                (
                    ImportStatus::Cancelled,
                    format!("Import cancelled after reaching {:?}", last_state),
                )
            }
            Err(e) => {
                error!(error = %e, last_state = ?last_state, "Topology import failed");
                self.state = LoaderState::Failed;
                (ImportStatus::Failed, e.to_string())
            }
        };

        let result = ImportResult {
            status,
            status_code: status.code(),
            status_message,
            last_state,
            nodes_processed: progress.nodes.nodes_processed,
            nodes_created: progress.nodes.nodes_created,
            nodes_updated: progress.nodes.nodes_updated,
            rows_rejected: progress.nodes.rows_rejected,
            edges_processed: progress.relationships.edges_processed,
            edges_skipped: progress.relationships.edges_skipped,
            started_at,
            elapsed_ms: millis(start.elapsed()),
            timings: progress.timings,
        };

        info!(
            status = ?result.status,
            nodes_processed = result.nodes_processed,
            rows_rejected = result.rows_rejected,
            edges_processed = result.edges_processed,
            edges_skipped = result.edges_skipped,
            elapsed_ms = result.elapsed_ms,
            "Topology import finished"
        );
        result
    }

    async fn run_phases(
        &mut self,
        store: &dyn GraphStore,
        devices: RowSource,
        relationships: RowSource,
        progress: &mut RunProgress,
    ) -> Result<LoadOutcome, LoaderError> {
        if self.cancel.is_cancelled() {
            return Ok(LoadOutcome::Cancelled);
        }

        let phase = Instant::now();
        store.verify_connectivity().await?;
        self.constraints.ensure_constraints(store).await?;
        progress.timings.constraints_ms = millis(phase.elapsed());
        self.state = LoaderState::ConstraintsEnsured;

        let phase = Instant::now();
        let mut node_loader = NodeLoader::new(
            self.config.node_label.clone(),
            self.config.mapper.clone(),
            self.config.batch_size,
        )
        .with_secondary_labels(self.config.secondary_labels);
        let nodes = node_loader.load(store, devices, &self.cancel).await;
        progress.nodes = node_loader.summary();
        progress.timings.nodes_ms = millis(phase.elapsed());
        if nodes? == LoadOutcome::Cancelled {
            return Ok(LoadOutcome::Cancelled);
        }
        self.state = LoaderState::NodesLoaded;
        info!(
            nodes_processed = progress.nodes.nodes_processed,
            rows_rejected = progress.nodes.rows_rejected,
            "Nodes loaded"
        );

        let phase = Instant::now();
        let mut relationship_loader =
            RelationshipLoader::new(self.config.node_label.clone(), self.config.batch_size);
        let edges = relationship_loader
            .load(store, relationships, &self.cancel)
            .await;
        progress.relationships = relationship_loader.summary();
        progress.timings.relationships_ms = millis(phase.elapsed());
        if edges? == LoadOutcome::Cancelled {
            return Ok(LoadOutcome::Cancelled);
        }
        self.state = LoaderState::RelationshipsLoaded;
        info!(
            edges_processed = progress.relationships.edges_processed,
            edges_skipped = progress.relationships.edges_skipped,
            "Relationships loaded"
        );

        Ok(LoadOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topology_graph_store::{FaultPlan, MemoryConnector};

    fn orchestrator(connector: MemoryConnector) -> LoaderOrchestrator {
        LoaderOrchestrator::new(Arc::new(connector), LoaderConfig::new("CI").unwrap()).unwrap()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ImportStatus::Complete.code(), 200);
        assert_eq!(ImportStatus::Failed.code(), 500);
        assert_eq!(ImportStatus::Cancelled.code(), 499);
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let config = LoaderConfig::new("CI").unwrap().with_batch_size(0);
        assert!(LoaderOrchestrator::new(Arc::new(MemoryConnector::new()), config).is_err());
    }

    #[tokio::test]
    async fn test_empty_sources_complete() {
        let connector = MemoryConnector::new();
        let mut orchestrator = orchestrator(connector.clone());

        let result = orchestrator
            .run(RowSource::Rows(vec![]), RowSource::Rows(vec![]))
            .await;

        assert!(result.is_complete());
        assert_eq!(result.status_code, 200);
        assert_eq!(result.last_state, LoaderState::RelationshipsLoaded);
        assert_eq!(orchestrator.state(), LoaderState::Complete);
        assert_eq!(connector.snapshot().await.constraints.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_without_session() {
        let connector = MemoryConnector::with_faults(FaultPlan {
            unreachable: true,
            ..FaultPlan::default()
        });
        let mut orchestrator = orchestrator(connector.clone());

        let result = orchestrator
            .run(RowSource::Rows(vec![]), RowSource::Rows(vec![]))
            .await;

        assert_eq!(result.status, ImportStatus::Failed);
        assert_eq!(result.last_state, LoaderState::Idle);
        assert!(result.status_message.contains("simulated unreachable"));
        assert_eq!(connector.snapshot().await.sessions_opened, 0);
    }

    #[tokio::test]
    async fn test_constraint_rejection_is_fatal() {
        let connector = MemoryConnector::with_faults(FaultPlan {
            reject_constraints: true,
            ..FaultPlan::default()
        });
        let mut orchestrator = orchestrator(connector.clone());

        let result = orchestrator
            .run(RowSource::Rows(vec![]), RowSource::Rows(vec![]))
            .await;

        assert_eq!(result.status_code, 500);
        assert_eq!(result.last_state, LoaderState::Idle);
        assert_eq!(orchestrator.state(), LoaderState::Failed);
        let snapshot = connector.snapshot().await;
        assert_eq!(snapshot.sessions_closed, 1);
        assert_eq!(snapshot.committed_batches, 0);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = ImportResult {
            status: ImportStatus::Cancelled,
            status_code: 499,
            status_message: "cancelled".to_string(),
            last_state: LoaderState::NodesLoaded,
            nodes_processed: 3,
            nodes_created: 3,
            nodes_updated: 0,
            rows_rejected: 0,
            edges_processed: 0,
            edges_skipped: 0,
            started_at: Utc::now(),
            elapsed_ms: 12,
            timings: PhaseTimings::default(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "cancelled");
        assert_eq!(json["statusCode"], 499);
        assert_eq!(json["lastState"], "nodesLoaded");
        assert_eq!(json["timings"]["nodesMs"], 0);
    }
}
