// Error types for session storage backends

use std::time::Duration;

use thiserror::Error;

/// Result type alias for session storage operations
pub type Result<T> = std::result::Result<T, SessionStorageError>;

/// Errors surfaced by session storage backends
///
/// All payloads are strings or scalars so the type stays `Clone`: a
/// backend resolves its shared readiness signal with a single value and
/// every operation waiting on it observes that same failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionStorageError {
    /// Connection configuration rejected before any attempt was made
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Partition key path is not the id path and no id resolver was configured
    #[error("partition key is not the id and no partition-key-by-id resolver was configured")]
    PartitionKeyById,

    /// Partition key path is not the id path and no shop resolver was configured
    #[error("partition key is not the id and no partition-key-by-shop resolver was configured")]
    PartitionKeyByShop,

    /// Credentials were rejected by the backend; never retried
    #[error("invalid credentials provided: {0}")]
    Authentication(String),

    /// An initialization attempt exceeded its deadline
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Initialization retry budget exhausted; wraps the last underlying cause
    #[error("failed to initialize storage (code {code:?}): {message}")]
    Initialization {
        /// Status code of the last underlying failure, when one was reported
        code: Option<u16>,
        message: String,
    },

    /// An operation-level failure from the underlying client
    #[error("storage backend error (code {code:?}): {message}")]
    Backend {
        /// Status code reported by the client, when available
        code: Option<u16>,
        message: String,
    },

    /// A stored document could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SessionStorageError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        SessionStorageError::Configuration(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        SessionStorageError::Authentication(msg.into())
    }

    /// Create an operation-level backend error
    pub fn backend(code: Option<u16>, msg: impl Into<String>) -> Self {
        SessionStorageError::Backend {
            code,
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        SessionStorageError::Serialization(msg.into())
    }
}
