//! # Topology Loader
//!
//! Bulk loader for device topologies: reads device and relationship records
//! from CSV and merges them into a property graph as deduplicated nodes and
//! typed, attributed edges.
//!
//! ## Architecture
//!
//! 1. **Source**: reads CSV rows and forms transaction-sized batches
//! 2. **Mapping**: translates device columns into canonical attributes
//! 3. **Constraints**: prepares the uniqueness constraint and indexes
//! 4. **Loader**: upserts nodes, then merges edges, one batch per transaction
//! 5. **Orchestrator**: sequences the phases and reports an [`ImportResult`]
//!
//! ## Modules
//!
//! - [`config`]: Environment-driven configuration
//! - [`source`]: Row sources and batch formation
//! - [`mapping`]: Field mapping tables
//! - [`constraints`]: Schema preparation
//! - [`loader`]: Node and relationship loaders
//! - [`orchestrator`]: Import run coordination
//! - [`retrieval`]: Neighbour lookups over a loaded graph
//! - [`cancellation`]: Cooperative cancellation
//! - [`telemetry`]: Tracing setup
//! - [`errors`]: Error types for the loader

pub mod cancellation;
pub mod config;
pub mod constraints;
pub mod errors;
pub mod loader;
pub mod mapping;
pub mod orchestrator;
pub mod retrieval;
pub mod source;
pub mod telemetry;

pub use cancellation::CancellationHandle;
pub use config::{LoaderConfig, StoreConfig};
pub use errors::{ConfigError, LoaderError};
pub use mapping::{FieldMapper, FieldMapping};
pub use orchestrator::{ImportResult, ImportStatus, LoaderOrchestrator, LoaderState};
pub use retrieval::{NeighborRetriever, RelationSpec};
pub use source::{RawRow, RowSource};
