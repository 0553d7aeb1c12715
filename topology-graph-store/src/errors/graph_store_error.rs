//! Graph store error types.
//!
//! Covers both driver-level failures (connection, authentication, query
//! execution) and failures that the loader must treat as fatal for a run
//! (constraint rejection, transient unavailability mid-batch).

use thiserror::Error;

/// Unified errors from graph store operations.
///
/// Used by the `GraphStore` and `GraphStoreConnector` traits. Every variant is
/// fatal for the current import run; row-level defects are never reported
/// through this type, they are counted in the batch outcomes instead.
#[derive(Debug, Clone, Error)]
pub enum GraphStoreError {
    /// The store could not be reached.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The store rejected the supplied credentials.
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// A uniqueness constraint could not be declared, usually because existing
    /// data already violates it.
    #[error("Constraint rejected: {0}")]
    ConstraintRejected(String),

    /// A statement failed to execute.
    #[error("Query error: {0}")]
    QueryError(String),

    /// The store was temporarily unavailable while a batch was in flight.
    #[error("Transient error: {0}")]
    TransientError(String),

    /// A label, relationship type or property name cannot be used as an identifier.
    #[error("Invalid identifier {name:?}: {reason}")]
    InvalidIdentifier { name: String, reason: String },

    /// A result row could not be decoded.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// The session was used after `close` was called.
    #[error("Store session already closed")]
    Closed,
}

impl GraphStoreError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create an authentication error.
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::AuthenticationError(msg.into())
    }

    /// Create a constraint rejection error.
    pub fn constraint_rejected(msg: impl Into<String>) -> Self {
        Self::ConstraintRejected(msg.into())
    }

    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryError(msg.into())
    }

    /// Create a transient error.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientError(msg.into())
    }

    /// Create an invalid identifier error.
    pub fn invalid_identifier(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::DecodeError(msg.into())
    }
}

impl From<neo4rs::Error> for GraphStoreError {
    fn from(err: neo4rs::Error) -> Self {
        match err {
            neo4rs::Error::AuthenticationError(msg) => Self::AuthenticationError(msg),
            neo4rs::Error::ConnectionError => Self::ConnectionError(err.to_string()),
            neo4rs::Error::IOError { .. } => Self::ConnectionError(err.to_string()),
            other => classify_server_message(other.to_string()),
        }
    }
}

/// Map a server failure onto the taxonomy using its Neo4j status code.
fn classify_server_message(message: String) -> GraphStoreError {
    if message.contains("Neo.TransientError") || message.contains("ServiceUnavailable") {
        GraphStoreError::TransientError(message)
    } else if message.contains("ConstraintCreationFailed")
        || message.contains("ConstraintValidationFailed")
        || message.contains("EquivalentSchemaRuleAlreadyExists")
    {
        GraphStoreError::ConstraintRejected(message)
    } else if message.contains("Security.Unauthorized") {
        GraphStoreError::AuthenticationError(message)
    } else {
        GraphStoreError::QueryError(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_transient() {
        let err = classify_server_message(
            "Neo.TransientError.General.DatabaseUnavailable: try again".to_string(),
        );
        assert!(matches!(err, GraphStoreError::TransientError(_)));
    }

    #[test]
    fn test_classify_constraint_failure() {
        let err = classify_server_message(
            "Neo.ClientError.Schema.ConstraintCreationFailed: duplicate assetId".to_string(),
        );
        assert!(matches!(err, GraphStoreError::ConstraintRejected(_)));
    }

    #[test]
    fn test_classify_unknown_is_query_error() {
        let err = classify_server_message("Neo.ClientError.Statement.SyntaxError".to_string());
        assert!(matches!(err, GraphStoreError::QueryError(_)));
    }

    #[test]
    fn test_invalid_identifier_message() {
        let err = GraphStoreError::invalid_identifier("", "must not be blank");
        assert_eq!(
            err.to_string(),
            "Invalid identifier \"\": must not be blank"
        );
    }
}
