//! Error types for the forum content backend

use thiserror::Error;

use crate::codec::CodecError;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the content backend.
///
/// `Clone` is required: the coalescer hands one result to every caller
/// waiting on the same key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Repository / database failure
    #[error("Origin error: {0}")]
    Origin(String),

    /// Entity absent at origin when a mutation targeted it
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Bad input (ids, paging, empty fields)
    #[error("Validation error: {0}")]
    Validation(String),

    // =========================================================================
    // Cache Tier Errors
    // =========================================================================
    /// L2 network or timeout failure
    #[error("Cache transport error: {0}")]
    CacheTransport(String),

    /// Malformed cached payload
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the failure belongs to a cache tier.
    ///
    /// Cache failures are never surfaced to callers; they degrade to a miss.
    pub fn is_cache_failure(&self) -> bool {
        matches!(self, Error::CacheTransport(_) | Error::Codec(_))
    }

    /// Shorthand for a not-found on a given entity
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Error::NotFound { entity, id }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Internal(format!("I/O error: {}", e))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::CacheTransport(e.to_string())
    }
}

impl From<deadpool_redis::PoolError> for Error {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Error::CacheTransport(e.to_string())
    }
}
