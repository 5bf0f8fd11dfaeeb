//! Domain errors for the orchestrator.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the orchestration core.
///
/// Variants map directly onto the error taxonomy of kinds (not exception
/// types): each carries exactly the data a caller needs to decide
/// retryable-vs-terminal, without inspecting the message string. See
/// `services::retry_policy::classify` for the single place that enumerates
/// this mapping.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("Duplicate key: {entity} {id} already exists")]
    Conflict { entity: String, id: String },

    #[error("Rate limit exhausted for bucket {bucket}")]
    RateLimited { bucket: String },

    #[error("No namespace available for prefix {prefix}")]
    NamespaceUnavailable { prefix: String },

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl DomainError {
    /// The explicit retry-classification table from the error handling
    /// design: enumerated once here, never re-derived from the message
    /// text.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::NamespaceUnavailable { .. } | Self::Transient(_)
        )
    }
}
