//! Error types for the batching coordinator

use batchline_core::{CodecError, StorageError};
use thiserror::Error;

/// Errors surfaced by [`BatchCoordinator`](crate::BatchCoordinator)
///
/// Transport failures never appear here: they are retried by the worker
/// and reported through [`CoordinatorEvent`](crate::CoordinatorEvent).
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Invalid configuration, or a store that cannot be opened
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A payload could not be encoded at the ingestion boundary
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The worker has stopped
    #[error("Coordinator closed")]
    Closed,
}

impl CoordinatorError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<toml::de::Error> for CoordinatorError {
    fn from(e: toml::de::Error) -> Self {
        CoordinatorError::Config(e.to_string())
    }
}

/// Result type alias for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
