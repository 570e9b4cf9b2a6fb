//! Error types for search operations

use crate::error::AppError;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur during search operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    /// Malformed request bounds
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Transient network failure (timeout, reset) after the retry budget is spent
    #[error("Connection to search backend failed: {0}")]
    Connection(String),

    /// Cluster is disconnected or red; requests fail fast
    #[error("Search backend unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected the query (malformed DSL, mapping mismatch)
    #[error("Backend rejected query ({error_type}, status {status}): {reason}")]
    BackendQuery {
        error_type: String,
        reason: String,
        status: u16,
    },

    /// Per-request deadline elapsed
    #[error("Search timed out after {0}ms")]
    Timeout(u64),

    /// Request was cancelled before completion
    #[error("Search request cancelled")]
    Cancelled,

    /// Cache store unreachable
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Analytics sink rejected an event
    #[error("Analytics failure: {0}")]
    Analytics(String),

    /// Catalog store lookup failed
    #[error("Catalog lookup failed: {0}")]
    Catalog(String),

    /// Response could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl SearchError {
    /// Only transient transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::Connection(_) | SearchError::Timeout(_))
    }

    /// Short machine-readable tag, used as a metric label
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::Validation(_) => "validation",
            SearchError::Connection(_) => "connection",
            SearchError::Unavailable(_) => "unavailable",
            SearchError::BackendQuery { .. } => "backend_query",
            SearchError::Timeout(_) => "timeout",
            SearchError::Cancelled => "cancelled",
            SearchError::CacheUnavailable(_) => "cache",
            SearchError::Analytics(_) => "analytics",
            SearchError::Catalog(_) => "catalog",
            SearchError::Serialization(_) => "serialization",
            SearchError::InvalidConfiguration(_) => "configuration",
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serialization(err.to_string())
    }
}

impl From<validator::ValidationErrors> for SearchError {
    fn from(err: validator::ValidationErrors) -> Self {
        SearchError::Validation(err.to_string())
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Validation(msg) => AppError::Validation(msg),
            SearchError::BackendQuery {
                error_type,
                reason,
                status,
            } => AppError::BadRequest(format!("{} ({}): {}", error_type, status, reason)),
            SearchError::Connection(msg) | SearchError::Unavailable(msg) => {
                AppError::ServiceUnavailable(msg)
            }
            SearchError::Timeout(ms) => AppError::Timeout(format!("search exceeded {}ms", ms)),
            SearchError::Cancelled => AppError::Cancelled,
            SearchError::InvalidConfiguration(msg) => AppError::Configuration(msg),
            SearchError::Serialization(msg) => AppError::Serialization(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}
