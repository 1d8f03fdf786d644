//! Redis error types.

use pagecache_core::CacheError;
use thiserror::Error;

/// Result type for Redis operations.
pub type Result<T> = std::result::Result<T, RedisError>;

/// Redis errors.
#[derive(Debug, Error)]
pub enum RedisError {
    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Pool error.
    #[error("Pool error: {0}")]
    Pool(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A command exceeded the configured deadline.
    #[error("Operation timed out")]
    Timeout,

    /// Underlying Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl RedisError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout | Self::Pool(_) => true,
            Self::Redis(err) => err.is_timeout() || err.is_connection_dropped(),
            Self::Config(_) => false,
        }
    }

    /// Check if this error indicates connection loss.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Redis(err) => err.is_connection_refusal() || err.is_connection_dropped(),
            _ => false,
        }
    }
}

impl<E> From<bb8::RunError<E>> for RedisError
where
    E: std::error::Error + 'static,
{
    fn from(err: bb8::RunError<E>) -> Self {
        match err {
            bb8::RunError::TimedOut => Self::Timeout,
            bb8::RunError::User(err) => Self::Pool(err.to_string()),
        }
    }
}

impl From<RedisError> for CacheError {
    fn from(err: RedisError) -> Self {
        match err {
            RedisError::Timeout => CacheError::Timeout,
            RedisError::Redis(err) if err.is_timeout() => CacheError::Timeout,
            RedisError::Config(msg) => CacheError::Config(msg),
            err if err.is_connection_error() => CacheError::Connection(err.to_string()),
            RedisError::Pool(msg) => CacheError::Connection(msg),
            err => CacheError::Store(err.to_string()),
        }
    }
}
