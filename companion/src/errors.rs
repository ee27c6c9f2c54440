//! Error types for the DashMaster companion

use thiserror::Error;

/// Main error type for the companion
#[derive(Error, Debug)]
pub enum CompanionError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    CapacityExhausted(String),

    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Domain classification of an error, independent of its detail message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    ValidationError,
    CapacityExhausted,
    UpstreamUnavailable,
    StorageFailure,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::CapacityExhausted => "capacity_exhausted",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::StorageFailure => "storage_failure",
            ErrorKind::Internal => "internal",
        }
    }
}

impl CompanionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompanionError::NotFound(_) => ErrorKind::NotFound,
            CompanionError::InvalidState(_) => ErrorKind::InvalidState,
            CompanionError::ValidationError(_) => ErrorKind::ValidationError,
            CompanionError::CapacityExhausted(_) => ErrorKind::CapacityExhausted,
            CompanionError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            CompanionError::StorageFailure(_) | CompanionError::IoError(_) => {
                ErrorKind::StorageFailure
            }
            _ => ErrorKind::Internal,
        }
    }

    /// Re-label any error as a storage failure, keeping its message
    pub fn into_storage(self) -> Self {
        match self {
            CompanionError::StorageFailure(_) => self,
            other => CompanionError::StorageFailure(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for CompanionError {
    fn from(err: anyhow::Error) -> Self {
        CompanionError::Internal(err.to_string())
    }
}
