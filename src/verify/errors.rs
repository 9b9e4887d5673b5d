//! Verification error types
//!
//! Error codes:
//! - DEVB_VERIFY_IO (ERROR severity)
//! - DEVB_VERIFY_MANIFEST (ERROR severity)

use std::fmt;
use std::io;

/// Verify-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyErrorCode {
    /// I/O failure while hashing or walking
    VerifyIo,
    /// Manifest serialization/persistence failure
    VerifyManifest,
}

impl VerifyErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            VerifyErrorCode::VerifyIo => "DEVB_VERIFY_IO",
            VerifyErrorCode::VerifyManifest => "DEVB_VERIFY_MANIFEST",
        }
    }
}

impl fmt::Display for VerifyErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Verification error with context
#[derive(Debug)]
pub struct VerifyError {
    code: VerifyErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl VerifyError {
    /// Create a new I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: VerifyErrorCode::VerifyIo,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create an I/O error with path context
    pub fn io_error_at_path(path: &std::path::Path, source: io::Error) -> Self {
        Self {
            code: VerifyErrorCode::VerifyIo,
            message: format!("I/O error at path: {}", path.display()),
            source: Some(source),
        }
    }

    /// Create a new manifest error
    pub fn manifest_error(message: impl Into<String>) -> Self {
        Self {
            code: VerifyErrorCode::VerifyManifest,
            message: message.into(),
            source: None,
        }
    }

    /// Create a manifest error with I/O source
    pub fn manifest_io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: VerifyErrorCode::VerifyManifest,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> VerifyErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ERROR] {}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for VerifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerifyError>;
