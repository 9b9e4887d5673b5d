//! Snapshot error types
//!
//! Error codes:
//! - DEVB_SNAPSHOT_FAILED (ERROR severity)
//! - DEVB_SNAPSHOT_IO (ERROR severity)
//! - DEVB_SNAPSHOT_REPLICATION (ERROR severity)

use std::fmt;
use std::io;

/// Severity levels for snapshot errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, process continues
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Snapshot-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotErrorCode {
    /// General snapshot creation failure
    SnapshotFailed,
    /// I/O failure during staging or commit
    SnapshotIo,
    /// Replicator failure after retries
    SnapshotReplication,
}

impl SnapshotErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            SnapshotErrorCode::SnapshotFailed => "DEVB_SNAPSHOT_FAILED",
            SnapshotErrorCode::SnapshotIo => "DEVB_SNAPSHOT_IO",
            SnapshotErrorCode::SnapshotReplication => "DEVB_SNAPSHOT_REPLICATION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        // Snapshot failure never requires process termination
        Severity::Error
    }
}

impl fmt::Display for SnapshotErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Snapshot error type with context
#[derive(Debug)]
pub struct SnapshotError {
    code: SnapshotErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl SnapshotError {
    /// Create a new snapshot failed error
    pub fn snapshot_failed(message: impl Into<String>) -> Self {
        Self {
            code: SnapshotErrorCode::SnapshotFailed,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new snapshot I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: SnapshotErrorCode::SnapshotIo,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a snapshot I/O error with path context
    pub fn io_error_at_path(path: &std::path::Path, source: io::Error) -> Self {
        Self {
            code: SnapshotErrorCode::SnapshotIo,
            message: format!("I/O error at path: {}", path.display()),
            source: Some(source),
        }
    }

    /// Create a replication error
    pub fn replication_error(message: impl Into<String>) -> Self {
        Self {
            code: SnapshotErrorCode::SnapshotReplication,
            message: message.into(),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> SnapshotErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for snapshot operations
pub type SnapshotOpResult<T> = Result<T, SnapshotError>;
