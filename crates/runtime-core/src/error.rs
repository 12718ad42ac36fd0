//! Error types for the distributed checkpoint runtime

use thiserror::Error;

use crate::Rank;

/// Result type alias using the runtime Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for distributed checkpointing
#[derive(Error, Debug)]
pub enum Error {
    // Checkpoint errors
    #[error("Checkpoint not found: {checkpoint_id}")]
    CheckpointNotFound { checkpoint_id: String },

    #[error("Checkpoint write failed: {message}")]
    CheckpointWriteFailed { message: String },

    #[error("Malformed checkpoint filename {filename:?}: {reason}")]
    MalformedFilename { filename: String, reason: String },

    #[error("Controller in invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    // Storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Storage path not found: {path}")]
    StoragePathNotFound { path: String },

    // Collective errors
    #[error("Collective protocol error on rank {rank}: {message}")]
    Protocol { rank: Rank, message: String },

    #[error("Collective transport closed: {channel}")]
    ChannelClosed { channel: String },

    #[error("Rank {rank} out of range for communicator of size {size}")]
    InvalidRank { rank: Rank, size: usize },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage { .. } | Error::Io(_))
    }

    /// Returns true if this error indicates a fatal condition
    ///
    /// Fatal errors are expected to terminate the rank; the remaining ranks
    /// then stall in their next collective until the job is restarted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Protocol { .. }
                | Error::CheckpointNotFound { .. }
                | Error::CheckpointWriteFailed { .. }
                | Error::MalformedFilename { .. }
                | Error::InvalidConfig { .. }
                | Error::ChannelClosed { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
