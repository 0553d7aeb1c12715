//! Schema preparation ahead of any write.

use tracing::{info, instrument};

use topology_graph_store::{ConstraintSpec, GraphStore, GraphStoreError, IndexSpec};

use crate::config::LoaderConfig;

/// Ensures the node uniqueness constraint and lookup indexes exist.
///
/// Every statement is `IF NOT EXISTS`, so running the manager against an
/// already-prepared store is a no-op.
#[derive(Debug, Clone)]
pub struct ConstraintManager {
    constraint: ConstraintSpec,
    indexes: Vec<IndexSpec>,
}

impl ConstraintManager {
    pub fn new(constraint: ConstraintSpec, indexes: Vec<IndexSpec>) -> Self {
        Self {
            constraint,
            indexes,
        }
    }

    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config.constraint_spec(), config.index_specs())
    }

    /// Declare the constraint, then each index. Stops at the first failure.
    #[instrument(skip_all, fields(constraint = %self.constraint.name()))]
    pub async fn ensure_constraints(&self, store: &dyn GraphStore) -> Result<(), GraphStoreError> {
        store.ensure_constraint(&self.constraint).await?;
        info!(
            label = %self.constraint.label.as_str(),
            mode = ?self.constraint.mode,
            kind = ?self.constraint.kind,
            "Uniqueness constraint in place"
        );

        for index in &self.indexes {
            store.ensure_index(index).await?;
            info!(index = %index.name(), "Index in place");
        }
        Ok(())
    }
}
