//! Destination and space probe errors

use thiserror::Error;

/// Destination validation errors
#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("Destination not found: {0} (volume may not be mounted)")]
    NotMounted(String),

    #[error("Destination not found: {0}")]
    NotFound(String),

    #[error("Destination is not a directory: {0}")]
    NotADirectory(String),

    #[error("Destination not writable: {0}")]
    NotWritable(String),

    #[error("Unable to determine available space at {path}: {detail}")]
    SpaceUnavailable { path: String, detail: String },
}

/// Result type for destination operations
pub type DestinationResult<T> = Result<T, DestinationError>;

/// Space validation errors
#[derive(Debug, Error)]
pub enum SpaceError {
    #[error(
        "Insufficient space at {destination}: {available} bytes available, {estimated} bytes estimated"
    )]
    Insufficient {
        destination: String,
        available: u64,
        estimated: u64,
    },

    #[error("Space probe failed: {0}")]
    Probe(#[from] DestinationError),
}

/// Result type for space operations
pub type SpaceOpResult<T> = Result<T, SpaceError>;
