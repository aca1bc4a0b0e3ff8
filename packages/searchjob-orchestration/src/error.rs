use searchjob_storage::{ErrorKind, StorageError};
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Job store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("Revision resolution failed: {0}")]
    Resolution(String),

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Result sink error: {0}")]
    Sink(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    pub fn resolution<E: std::fmt::Display>(e: E) -> Self {
        Self::Resolution(e.to_string())
    }

    pub fn search<E: std::fmt::Display>(e: E) -> Self {
        Self::Search(e.to_string())
    }

    pub fn sink<E: std::fmt::Display>(e: E) -> Self {
        Self::Sink(e.to_string())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            OrchestratorError::InvalidQuery(_)
            | OrchestratorError::NotFound(_)
            | OrchestratorError::Forbidden(_)
            | OrchestratorError::Config(_) => ErrorCategory::Permanent,
            OrchestratorError::StoreUnavailable(_)
            | OrchestratorError::Resolution(_)
            | OrchestratorError::Search(_) => ErrorCategory::Transient,
            OrchestratorError::Storage(_)
            | OrchestratorError::Sink(_)
            | OrchestratorError::Io(_) => ErrorCategory::Infrastructure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

impl From<StorageError> for OrchestratorError {
    fn from(err: StorageError) -> Self {
        match err.kind {
            ErrorKind::InvalidQuery => Self::InvalidQuery(err.message),
            ErrorKind::NotFound => Self::NotFound(err.message),
            ErrorKind::Forbidden => Self::Forbidden(err.message),
            ErrorKind::Unavailable => Self::StoreUnavailable(err.message),
            ErrorKind::Database | ErrorKind::Conflict | ErrorKind::Config => Self::Storage(err),
        }
    }
}

/// Error category for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCategory {
    /// Transient error - retry automatically (e.g., busy store, missing revision)
    Transient,
    /// Permanent error - don't retry (e.g., invalid query, forbidden)
    Permanent,
    /// Infrastructure error - alert ops (e.g., disk full, corrupt database)
    Infrastructure,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
            ErrorCategory::Infrastructure => "infrastructure",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
