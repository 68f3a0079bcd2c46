//! Error types for Batchline

use thiserror::Error;

/// Errors raised by durable store implementations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The store exists but its contents cannot be interpreted
    #[error("Corrupt store: {0}")]
    Corrupt(String),

    #[error("Invalid database name: {0}")]
    InvalidName(String),
}

impl StorageError {
    /// Create a new database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Create a new Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a new Deserialization error
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization(message.into())
    }

    /// Create a new Corrupt error
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// Errors reported by a transport when a batch could not be delivered
///
/// Every variant is retryable from the coordinator's point of view: the
/// batch stays in the store and is resent on the next trigger.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint answered with a status other than 200
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Network error: {0}")]
    Network(String),

    /// The outgoing batch could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The receiver explicitly refused the batch
    #[error("Batch rejected: {0}")]
    Rejected(String),

    /// The transport was configured with values it cannot use
    #[error("Invalid transport configuration: {0}")]
    Config(String),

    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    /// Create a new Network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Create a new Rejected error
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// Errors raised by payload codecs at the ingestion boundary
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode payload: {0}")]
    Encode(String),

    #[error("Failed to decode payload: {0}")]
    Decode(String),
}
