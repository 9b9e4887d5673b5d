//! Snapshot manifest structure and persistence.
//!
//! The manifest is the authoritative integrity record stored inside each
//! committed snapshot:
//!
//! ```json
//! {
//!   "snapshot_name": "2025-01-07-103000",
//!   "created_at": "2025-01-07T10:30:00Z",
//!   "file_count": 2,
//!   "total_size": 7,
//!   "checksums": [
//!     {"path": "a.txt", "size": 5, "mtime": 1736245800.0,
//!      "sha256": "2cf24d..."}
//!   ]
//! }
//! ```
//!
//! The manifest itself is excluded from its own file list.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{VerifyError, VerifyResult};

/// Name of the manifest file inside each committed snapshot.
pub const MANIFEST_FILENAME: &str = ".devbackup_manifest.json";

/// Checksum record for a single file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileChecksum {
    /// Path relative to the snapshot root
    pub path: String,
    pub size: u64,
    /// Seconds since the Unix epoch
    pub mtime: f64,
    /// 64-character lowercase hex digest
    pub sha256: String,
}

/// Integrity manifest for one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub snapshot_name: String,
    /// UTC creation time, ISO 8601 with trailing Z
    pub created_at: String,
    pub file_count: u64,
    pub total_size: u64,
    pub checksums: Vec<FileChecksum>,
}

impl Manifest {
    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> VerifyResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| VerifyError::manifest_error(format!("Failed to serialize manifest: {}", e)))
    }

    /// Parse a manifest from JSON.
    pub fn from_json(json: &str) -> VerifyResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| VerifyError::manifest_error(format!("Failed to parse manifest: {}", e)))
    }

    /// Path of the manifest inside a snapshot directory.
    pub fn path_in(snapshot_path: &Path) -> std::path::PathBuf {
        snapshot_path.join(MANIFEST_FILENAME)
    }

    /// Persist the manifest atomically inside the snapshot.
    ///
    /// Writes to a sibling temporary file, then renames it into place so
    /// readers never observe a partial manifest.
    pub fn save(&self, snapshot_path: &Path) -> VerifyResult<()> {
        let json = self.to_json()?;
        let manifest_path = Self::path_in(snapshot_path);

        let temp = tempfile::NamedTempFile::new_in(snapshot_path).map_err(|e| {
            VerifyError::manifest_io_error(
                format!("Failed to create temp manifest in {}", snapshot_path.display()),
                e,
            )
        })?;

        fs::write(temp.path(), json.as_bytes()).map_err(|e| {
            VerifyError::manifest_io_error(
                format!("Failed to write manifest: {}", manifest_path.display()),
                e,
            )
        })?;

        temp.persist(&manifest_path).map_err(|e| {
            VerifyError::manifest_io_error(
                format!("Failed to commit manifest: {}", manifest_path.display()),
                e.error,
            )
        })?;

        Ok(())
    }

    /// Load the manifest from a snapshot directory.
    ///
    /// Returns `None` when the manifest is absent or unparseable.
    pub fn load(snapshot_path: &Path) -> Option<Self> {
        let manifest_path = Self::path_in(snapshot_path);
        let content = fs::read_to_string(manifest_path).ok()?;
        Self::from_json(&content).ok()
    }
}
