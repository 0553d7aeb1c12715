//! Error types for the topology loader.
//!
//! Row-level defects (missing identifiers, dangling endpoints, malformed CSV
//! records) are never errors; they are counted in the load summaries.

use thiserror::Error;
use topology_graph_store::GraphStoreError;

/// Errors raised while reading or validating configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("{0} must be set")]
    MissingVariable(String),

    /// A setting has a value that cannot be used.
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    /// The field mapping table is unusable.
    #[error("Invalid field mapping: {0}")]
    InvalidMapping(String),
}

impl ConfigError {
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingVariable(name.into())
    }

    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn mapping(msg: impl Into<String>) -> Self {
        Self::InvalidMapping(msg.into())
    }
}

/// Errors that abort an import run.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Graph store error: {0}")]
    Store(#[from] GraphStoreError),

    /// The row source could not be opened or read.
    #[error("Source error: {0}")]
    Source(String),

    /// The batch worker died.
    #[error("Worker error: {0}")]
    Worker(String),
}

impl LoaderError {
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }
}

impl From<csv::Error> for LoaderError {
    fn from(err: csv::Error) -> Self {
        Self::Source(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::missing("NEO4J_URI").to_string(),
            "NEO4J_URI must be set"
        );
        assert_eq!(
            ConfigError::invalid("TOPOLOGY_BATCH_SIZE", "must be positive").to_string(),
            "Invalid value for TOPOLOGY_BATCH_SIZE: must be positive"
        );
    }

    #[test]
    fn test_store_error_converts() {
        let err: LoaderError = GraphStoreError::transient("leader switch").into();
        assert!(matches!(err, LoaderError::Store(GraphStoreError::TransientError(_))));
    }
}
