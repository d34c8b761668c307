//! Error types for the memory engine

use thiserror::Error;

/// Result type alias for memory engine operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Closed set of error kinds the engine can surface
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("external dependency failed: {0}")]
    External(String),

    #[error("schema corruption: {0}")]
    Corruption(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding request failed: {0}")]
    #[cfg(feature = "http-embedder")]
    Http(#[from] reqwest::Error),
}

impl MemoryError {
    /// Short machine-readable name for the error kind, used by the CLI's
    /// one-line stderr message
    pub fn kind(&self) -> &'static str {
        match self {
            MemoryError::NotFound(_) => "not_found",
            MemoryError::AlreadyExists(_) => "already_exists",
            MemoryError::InvalidArgument(_) => "invalid_argument",
            MemoryError::Conflict(_) => "conflict",
            MemoryError::External(_) => "external",
            MemoryError::Corruption(_) => "corruption",
            MemoryError::Internal(_) => "internal",
            MemoryError::Database(_) => "internal",
            MemoryError::Serialization(_) => "invalid_argument",
            MemoryError::Io(_) => "internal",
            #[cfg(feature = "http-embedder")]
            MemoryError::Http(_) => "external",
        }
    }

    /// True for failures a caller should treat as a soft degradation
    /// (e.g. fall back to FTS-only) rather than an abort.
    pub fn is_recoverable(&self) -> bool {
        #[cfg(feature = "http-embedder")]
        {
            matches!(self, MemoryError::External(_) | MemoryError::Http(_))
        }
        #[cfg(not(feature = "http-embedder"))]
        {
            matches!(self, MemoryError::External(_))
        }
    }
}
