//! Error types for checkpoint store operations

use thiserror::Error;

/// Result type for checkpoint store operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Error raised by a backing-store adapter.
///
/// Adapters box whatever their client library produces; the store wraps it in
/// [`CheckpointError::Connectivity`] without inspecting it.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during checkpoint store operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// An identifier cannot be encoded into (or a key decoded from) the key layout
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// A caller-supplied argument is unusable
    #[error("Invalid argument: {0}")]
    Invalid(String),

    /// A stored document or envelope could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The backing store could not be reached or rejected the request
    #[error("Backing store error: {0}")]
    Connectivity(#[source] BackendError),

    /// JSON encoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary encoding failed
    #[error("Binary serialization error: {0}")]
    BinarySerialization(#[from] bincode::Error),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    /// Wrap an adapter failure
    pub fn connectivity<E>(err: E) -> Self
    where
        E: Into<BackendError>,
    {
        CheckpointError::Connectivity(err.into())
    }

    /// Whether this error came from the backing store rather than the data
    pub fn is_connectivity(&self) -> bool {
        matches!(self, CheckpointError::Connectivity(_))
    }

    /// Whether this error reports corrupt or undecodable stored data
    pub fn is_decode(&self) -> bool {
        matches!(self, CheckpointError::Decode(_))
    }
}
