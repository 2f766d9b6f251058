//! Error types for agent-memstore

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the memory store
#[derive(Debug, Error)]
pub enum StoreError {
    /// RocksDB error
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// Serialization error (bincode)
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML header parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Lock not acquired within the timeout; another process may hold it
    #[error("timed out acquiring '{resource}' lock after {waited:?}; another process may be writing")]
    LockTimeout {
        resource: &'static str,
        waited: Duration,
    },

    /// Vector length does not match the store's fixed dimension
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Optional capability (embedding, rerank) not configured
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    /// Embedding/rerank request failed after the capability was configured
    #[error("transport error: {0}")]
    Transport(String),

    /// Persisted state could not be parsed; callers map this to "start fresh"
    #[error("corrupt {what}: {detail}")]
    Corrupt {
        what: &'static str,
        detail: String,
    },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Create an unavailable-capability error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a corrupt-state error
    pub fn corrupt(what: &'static str, detail: impl Into<String>) -> Self {
        Self::Corrupt {
            what,
            detail: detail.into(),
        }
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True for the "capability not configured" taxonomy class
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
