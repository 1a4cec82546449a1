//! Cache error types.

use thiserror::Error;

/// Errors that can occur in cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The key does not exist (or has expired). Not a transport failure.
    #[error("key not found: {0}")]
    NotFound(String),

    /// Redis transport or protocol error.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The configured cache URL could not be parsed.
    #[error("invalid cache URL: {0}")]
    InvalidUrl(String),
}

impl CacheError {
    /// Returns true for the not-found condition, false for real failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
