//! Error types for cache operations.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Key not found (e.g. incrementing a counter that does not exist)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// The backing store could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// A store operation exceeded its deadline
    #[error("Operation timeout")]
    Timeout,

    /// Any other failure reported by the backing store
    #[error("Store error: {0}")]
    Store(String),

    /// Missing or invalid construction options
    #[error("Configuration error: {0}")]
    Config(String),

    /// No backend is configured under this name
    #[error("Unknown cache backend: {0}")]
    UnknownBackend(String),

    /// The backend does not implement the requested capability
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl CacheError {
    /// Check if this error means the backend lacks a capability.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }

    /// Check if this error is worth retrying by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
