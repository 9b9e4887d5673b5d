//! CLI-specific error types.
//!
//! Every CLI failure maps onto the stable exit-code set.

use thiserror::Error;

use crate::backup::{EXIT_CONFIG_ERROR, EXIT_SNAPSHOT_ERROR};
use crate::config::ConfigError;

/// CLI errors
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("{0}")]
    Operation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => EXIT_CONFIG_ERROR,
            CliError::SnapshotNotFound(_) | CliError::Operation(_) | CliError::Io(_) => {
                EXIT_SNAPSHOT_ERROR
            }
        }
    }

    /// Stable code string for machine-readable output.
    pub fn code_str(&self) -> &'static str {
        match self {
            CliError::Config(_) => "DEVB_CLI_CONFIG_ERROR",
            CliError::SnapshotNotFound(_) => "DEVB_CLI_SNAPSHOT_NOT_FOUND",
            CliError::Operation(_) => "DEVB_CLI_OPERATION_FAILED",
            CliError::Io(_) => "DEVB_CLI_IO_ERROR",
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
