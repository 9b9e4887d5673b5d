//! Snapshot engine
//!
//! Creates incremental snapshots by replicating source trees into
//! timestamped directories under the backup root, hard-linking files
//! unchanged since the previous snapshot.
//!
//! The snapshot lifecycle:
//!
//! 1. Allocate a unique name (collision-safe, checked before staging)
//! 2. Replicate into `in_progress_<name>` with link-dest to the latest
//!    snapshot, through the retry driver
//! 3. On success, atomically rename the staging directory to its final
//!    name, then build and persist the integrity manifest
//! 4. On failure or cancellation, remove the staging directory
//!
//! A snapshot is either fully formed or absent; the commit rename is the
//! only way one becomes visible.

mod diff;
pub mod errors;
pub mod naming;
mod restore;
mod search;
pub mod walk;

pub use diff::DiffResult;
pub use errors::{SnapshotError, SnapshotErrorCode, SnapshotOpResult};
pub use naming::{IN_PROGRESS_PREFIX, TIMESTAMP_FORMAT};
pub use search::SearchHit;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::NaiveDateTime;

use crate::observability::Logger;
use crate::replicator::{parse_stats, ProgressCallback, ProgressReporter, Replicator};
use crate::retry::{retry_with_backoff, RetryConfig, RetryResult};
use crate::signals::SignalHandler;
use crate::verify::IntegrityVerifier;

/// Result of a snapshot operation.
#[derive(Debug, Default)]
pub struct SnapshotResult {
    pub success: bool,
    pub snapshot_path: Option<PathBuf>,
    /// Files that were actually copied (changed)
    pub files_transferred: u64,
    /// Total files in the snapshot (including unchanged)
    pub total_files: u64,
    pub total_size: u64,
    pub duration_seconds: f64,
    pub error_message: Option<String>,
    pub retry_result: Option<RetryResult>,
}

/// Information about a committed snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub path: PathBuf,
    pub timestamp: NaiveDateTime,
    pub size_bytes: u64,
    pub file_count: u64,
}

/// Creates and manages incremental snapshots under one backup root.
pub struct SnapshotEngine {
    destination: PathBuf,
    exclude_patterns: Vec<String>,
    retry_config: RetryConfig,
    rsync_program: PathBuf,
}

impl SnapshotEngine {
    pub fn new(
        destination: impl Into<PathBuf>,
        exclude_patterns: Vec<String>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            destination: destination.into(),
            exclude_patterns,
            retry_config,
            rsync_program: PathBuf::from("rsync"),
        }
    }

    /// Override the replicator binary (openrsync vs brew rsync, fakes in
    /// tests).
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.rsync_program = program.into();
        self
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Find the most recent committed snapshot (the link-dest target).
    ///
    /// Directories only; staging and dot-prefixed entries are ignored;
    /// the name must parse. Lexicographic order is chronological for
    /// both name forms, so the greatest name wins.
    pub fn find_latest_snapshot(&self) -> Option<PathBuf> {
        self.committed_snapshot_names()
            .into_iter()
            .max()
            .map(|name| self.destination.join(name))
    }

    fn committed_snapshot_names(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.destination) else {
            return Vec::new();
        };

        let mut names = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(IN_PROGRESS_PREFIX) || name.starts_with('.') {
                continue;
            }
            if !entry.path().is_dir() {
                continue;
            }
            if naming::parse_snapshot_name(&name).is_some() {
                names.push(name);
            }
        }
        names
    }

    /// Create a new incremental snapshot of the given sources.
    ///
    /// The staging path and replicator child are published to the signal
    /// handler while those regions are active, and cleared on the way
    /// out along every path.
    pub fn create_snapshot(
        &self,
        sources: &[PathBuf],
        signal_handler: Option<&SignalHandler>,
        progress_callback: Option<ProgressCallback>,
    ) -> SnapshotResult {
        let start = Instant::now();

        // The collision check runs against the live tree, so the root
        // must exist before allocation.
        if let Err(e) = fs::create_dir_all(&self.destination) {
            return Self::failed(
                SnapshotError::io_error_at_path(&self.destination, e).to_string(),
                start,
                None,
            );
        }

        let snapshot_name = naming::generate_unique_snapshot_name(&self.destination);
        let staging_path = self
            .destination
            .join(format!("{}{}", IN_PROGRESS_PREFIX, snapshot_name));
        let final_path = self.destination.join(&snapshot_name);

        if let Err(e) = fs::create_dir_all(&staging_path) {
            return Self::failed(
                SnapshotError::io_error_at_path(&staging_path, e).to_string(),
                start,
                None,
            );
        }

        if let Some(handler) = signal_handler {
            handler.set_staging_path(Some(staging_path.clone()));
        }

        let link_dest = self.find_latest_snapshot();

        let replicator = Replicator::new(
            &self.rsync_program,
            self.exclude_patterns.clone(),
            self.retry_config.rsync_timeout_seconds,
        );
        let reporter = progress_callback
            .map(|callback| Arc::new(Mutex::new(ProgressReporter::new(Some(callback)))));

        let (retry_result, outcome) = retry_with_backoff(
            || {
                let outcome = replicator.run(
                    sources,
                    &staging_path,
                    link_dest.as_deref(),
                    signal_handler,
                    reporter.clone(),
                );
                (outcome.return_code, outcome.error_message.clone(), outcome)
            },
            self.retry_config.max_retries,
            self.retry_config.base_delay_seconds,
            self.retry_config.max_delay_seconds,
            |_attempt| {},
        );

        if !retry_result.success {
            let _ = fs::remove_dir_all(&staging_path);
            if let Some(handler) = signal_handler {
                handler.set_staging_path(None);
            }

            let mut error_message = retry_result.final_error_message.clone().unwrap_or_else(|| {
                format!("rsync failed with code {}", retry_result.final_return_code)
            });
            if !retry_result.attempts.is_empty() {
                error_message = format!("{}\n{}", error_message, retry_result.retry_history());
            }

            return SnapshotResult {
                success: false,
                snapshot_path: None,
                duration_seconds: start.elapsed().as_secs_f64(),
                error_message: Some(error_message),
                retry_result: Some(retry_result),
                ..Default::default()
            };
        }

        let stdout = outcome.map(|o| o.stdout).unwrap_or_default();
        let stats = parse_stats(&stdout);

        if let Some(reporter) = &reporter {
            if let Ok(mut reporter) = reporter.lock() {
                reporter.report_final(
                    stats.files_transferred,
                    stats.total_size,
                    start.elapsed().as_secs_f64(),
                );
            }
        }

        // Atomic commit: same-filesystem rename.
        if let Err(e) = fs::rename(&staging_path, &final_path) {
            let _ = fs::remove_dir_all(&staging_path);
            if let Some(handler) = signal_handler {
                handler.set_staging_path(None);
            }
            return Self::failed(
                SnapshotError::io_error(
                    format!("Failed to commit snapshot {}", final_path.display()),
                    e,
                )
                .to_string(),
                start,
                Some(retry_result),
            );
        }

        if let Some(handler) = signal_handler {
            handler.set_staging_path(None);
        }

        // Manifest failure is logged but does not fail the backup.
        let mut total_files = stats.total_files;
        let manifest = IntegrityVerifier::create_manifest(&final_path);
        match IntegrityVerifier::save_manifest(&manifest, &final_path) {
            Ok(()) => {
                Logger::debug(
                    "MANIFEST_CREATED",
                    &[
                        ("snapshot", &snapshot_name),
                        ("files", &manifest.file_count.to_string()),
                    ],
                );
                if total_files == 0 {
                    total_files = manifest.file_count;
                }
            }
            Err(e) => {
                Logger::warn(
                    "MANIFEST_CREATE_FAILED",
                    &[("snapshot", &snapshot_name), ("error", &e.to_string())],
                );
            }
        }

        SnapshotResult {
            success: true,
            snapshot_path: Some(final_path),
            files_transferred: stats.files_transferred,
            total_files,
            total_size: stats.total_size,
            duration_seconds: start.elapsed().as_secs_f64(),
            error_message: None,
            retry_result: Some(retry_result),
        }
    }

    fn failed(
        message: String,
        start: Instant,
        retry_result: Option<RetryResult>,
    ) -> SnapshotResult {
        SnapshotResult {
            success: false,
            duration_seconds: start.elapsed().as_secs_f64(),
            error_message: Some(message),
            retry_result,
            ..Default::default()
        }
    }

    /// Remove `in_progress_*` directories left by interrupted runs.
    ///
    /// Returns the number removed.
    pub fn cleanup_incomplete(&self) -> u64 {
        let Ok(entries) = fs::read_dir(&self.destination) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir()
                && name.starts_with(IN_PROGRESS_PREFIX)
                && fs::remove_dir_all(entry.path()).is_ok()
            {
                removed += 1;
            }
        }
        removed
    }

    /// List committed snapshots with size and file-count metadata,
    /// most recent first.
    pub fn list_snapshots(&self) -> Vec<SnapshotInfo> {
        let mut snapshots: Vec<SnapshotInfo> = self
            .committed_snapshot_names()
            .into_iter()
            .filter_map(|name| {
                let timestamp = naming::parse_snapshot_name(&name)?;
                let path = self.destination.join(&name);
                let (size_bytes, file_count) = walk::directory_stats(&path);
                Some(SnapshotInfo {
                    path,
                    timestamp,
                    size_bytes,
                    file_count,
                })
            })
            .collect();

        snapshots.sort_by(|a, b| b.path.file_name().cmp(&a.path.file_name()));
        snapshots
    }

    /// Look up a committed snapshot by name.
    pub fn get_snapshot_by_name(&self, name: &str) -> Option<PathBuf> {
        if naming::parse_snapshot_name(name).is_none() {
            return None;
        }
        let path = self.destination.join(name);
        if path.is_dir() {
            Some(path)
        } else {
            None
        }
    }

    /// Restore a file or directory from a snapshot. See [`restore`].
    pub fn restore(
        &self,
        snapshot: &Path,
        source_path: &str,
        destination: Option<&Path>,
        source_directories: &[PathBuf],
    ) -> bool {
        restore::restore(snapshot, source_path, destination, source_directories)
    }

    /// Compare a snapshot against the current source state. See [`diff`].
    pub fn diff(
        &self,
        snapshot: &Path,
        source_directories: &[PathBuf],
        source_path: Option<&str>,
    ) -> DiffResult {
        diff::diff(snapshot, source_directories, source_path)
    }

    /// Search committed snapshots for files matching a glob pattern.
    pub fn search(&self, pattern: &str, snapshot: Option<&Path>) -> Vec<SearchHit> {
        let snapshots: Vec<PathBuf> = match snapshot {
            Some(path) => {
                if path.is_dir() {
                    vec![path.to_path_buf()]
                } else {
                    Vec::new()
                }
            }
            None => self.list_snapshots().into_iter().map(|s| s.path).collect(),
        };
        search::search(&snapshots, pattern)
    }
}
