//! Batched node and relationship loaders.
//!
//! Both loaders pull [`RowBatch`](crate::source::RowBatch)es from a source,
//! turn rows into store requests, and commit one batch per transaction in
//! input order. Running counts stay readable through `summary()` even when a
//! load ends in an error.

mod nodes;
mod relationships;

pub use nodes::{NodeLoadSummary, NodeLoader};
pub use relationships::{
    RelationshipLoadSummary, RelationshipLoader, RELATIONSHIP_TYPE_COLUMN, SOURCE_ASSET_COLUMN,
    TARGET_ASSET_COLUMN,
};

/// How a load that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Every batch of the source was committed.
    Completed,
    /// Cancellation was observed at a batch boundary.
    Cancelled,
}
