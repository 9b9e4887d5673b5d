//! Backup orchestration.
//!
//! Sequences one run end to end: lock, signal registration, destination
//! probe (queueing the run when the destination is away), staging
//! cleanup, source validation, free-space probe, snapshot creation and
//! retention. Two global invariants are enforced here:
//!
//! - the lock is released and the signal handler unregistered on every
//!   exit path (success, typed failure, unexpected error);
//! - retention failure never downgrades a successful snapshot.

use std::path::PathBuf;

use crate::config::Config;
use crate::destination::{validate_space, DiskSpaceProbe, SpaceEstimator};
use crate::lock::LockManager;
use crate::observability::{
    log_backup_complete, log_backup_error, log_backup_start, set_min_severity, Logger, Severity,
};
use crate::queue::{BackupQueue, QueuedBackup, REASON_DESTINATION_UNAVAILABLE};
use crate::replicator::ProgressCallback;
use crate::retention::{RetentionManager, RetentionResult};
use crate::signals::SignalHandler;
use crate::snapshot::{SnapshotEngine, SnapshotResult};

/// Stable exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CONFIG_ERROR: i32 = 1;
pub const EXIT_LOCK_ERROR: i32 = 2;
pub const EXIT_DESTINATION_ERROR: i32 = 3;
pub const EXIT_SNAPSHOT_ERROR: i32 = 4;
pub const EXIT_RETENTION_ERROR: i32 = 5;
pub const EXIT_SPACE_ERROR: i32 = 6;
pub const EXIT_PRECONDITION_SKIP: i32 = 7;
pub const EXIT_SIGNAL: i32 = crate::signals::SIGNAL_EXIT_CODE;

/// Per-run options.
pub struct BackupOptions {
    /// Enqueue the run when the destination is unavailable
    pub queue_on_dest_error: bool,
    /// Run the free-space probe before staging
    pub check_space: bool,
    /// Progress updates during replication
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            queue_on_dest_error: true,
            check_space: true,
            progress_callback: None,
        }
    }
}

/// Result of a backup run.
#[derive(Debug, Default)]
pub struct BackupResult {
    pub success: bool,
    pub exit_code: i32,
    pub snapshot_result: Option<SnapshotResult>,
    pub retention_result: Option<RetentionResult>,
    pub error_message: Option<String>,
    pub incomplete_cleaned: u64,
    /// The run was deferred into the persistent queue
    pub queued: bool,
}

impl BackupResult {
    fn error(exit_code: i32, message: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Run a complete backup with the default space probe.
pub fn run_backup(config: &Config, options: BackupOptions) -> BackupResult {
    run_backup_with_estimator(config, options, &DiskSpaceProbe)
}

/// Run a complete backup with an injected space probe.
pub fn run_backup_with_estimator(
    config: &Config,
    options: BackupOptions,
    estimator: &dyn SpaceEstimator,
) -> BackupResult {
    set_min_severity(Severity::from_name(&config.logging.level));
    log_backup_start(&config.source_directories, &config.backup_destination);

    let lock = LockManager::new(&config.lock_path);
    if let Err(e) = lock.acquire() {
        log_backup_error("lock acquisition", &e.to_string());
        return BackupResult::error(EXIT_LOCK_ERROR, e.to_string());
    }

    let handler = SignalHandler::new();
    handler.register(config.lock_path.clone());

    let result = run_locked(config, options, estimator, &handler);

    // Universal finally: these run on every path out of run_locked.
    handler.unregister();
    lock.release();

    result
}

fn run_locked(
    config: &Config,
    mut options: BackupOptions,
    estimator: &dyn SpaceEstimator,
    handler: &SignalHandler,
) -> BackupResult {
    // Destination probe; a missing destination optionally queues the run.
    if let Err(e) = crate::destination::validate_destination(&config.backup_destination) {
        log_backup_error("destination validation", &e.to_string());

        let mut queued = false;
        if options.queue_on_dest_error {
            let mut queue = BackupQueue::open(&config.queue_path);
            match queue.enqueue(
                &config.source_directories,
                &config.backup_destination,
                REASON_DESTINATION_UNAVAILABLE,
            ) {
                Ok(_) => queued = true,
                Err(queue_error) => {
                    Logger::warn("QUEUE_ENQUEUE_FAILED", &[("error", &queue_error.to_string())]);
                }
            }
        }

        return BackupResult {
            queued,
            ..BackupResult::error(EXIT_DESTINATION_ERROR, e.to_string())
        };
    }

    let engine = SnapshotEngine::new(
        &config.backup_destination,
        config.exclude_patterns.clone(),
        config.retry.to_retry_config(),
    )
    .with_program(&config.rsync_program);

    // Repair state left by a previous crash or signal.
    let incomplete_cleaned = engine.cleanup_incomplete();
    if incomplete_cleaned > 0 {
        Logger::info(
            "INCOMPLETE_CLEANED",
            &[("count", &incomplete_cleaned.to_string())],
        );
    }

    // Missing sources are dropped with a warning; a run with no sources
    // left is a failure.
    let valid_sources: Vec<PathBuf> = config
        .source_directories
        .iter()
        .filter(|source| {
            if source.exists() {
                true
            } else {
                Logger::warn(
                    "SOURCE_MISSING",
                    &[("path", &source.display().to_string())],
                );
                false
            }
        })
        .cloned()
        .collect();

    if valid_sources.is_empty() {
        let message = "All source directories are invalid";
        log_backup_error("source validation", message);
        return BackupResult {
            incomplete_cleaned,
            ..BackupResult::error(EXIT_SNAPSHOT_ERROR, message)
        };
    }

    // Free-space probe runs before the staging directory is created.
    if options.check_space {
        match validate_space(estimator, &config.backup_destination, &valid_sources) {
            Ok(check) => {
                Logger::debug(
                    "SPACE_VALIDATED",
                    &[
                        ("available_bytes", &check.available_bytes.to_string()),
                        ("estimated_bytes", &check.estimated_bytes.to_string()),
                    ],
                );
            }
            Err(e) => {
                log_backup_error("space validation", &e.to_string());
                return BackupResult {
                    incomplete_cleaned,
                    ..BackupResult::error(EXIT_SPACE_ERROR, e.to_string())
                };
            }
        }
    }

    let snapshot_result =
        engine.create_snapshot(&valid_sources, Some(handler), options.progress_callback.take());

    if !snapshot_result.success {
        let message = snapshot_result
            .error_message
            .clone()
            .unwrap_or_else(|| "Unknown snapshot error".to_string());
        log_backup_error("snapshot creation", &message);
        return BackupResult {
            incomplete_cleaned,
            snapshot_result: Some(snapshot_result),
            ..BackupResult::error(EXIT_SNAPSHOT_ERROR, message)
        };
    }

    // Retention runs strictly after the manifest is written and is
    // never fatal.
    let retention = RetentionManager::new(
        &config.backup_destination,
        config.retention.hourly,
        config.retention.daily,
        config.retention.weekly,
    );
    let retention_result = retention.apply_retention();
    if !retention_result.deleted_snapshots.is_empty() {
        Logger::info(
            "RETENTION_APPLIED",
            &[
                (
                    "deleted",
                    &retention_result.deleted_snapshots.len().to_string(),
                ),
                ("freed_bytes", &retention_result.freed_bytes.to_string()),
            ],
        );
    }

    if let Some(snapshot_path) = &snapshot_result.snapshot_path {
        log_backup_complete(
            snapshot_path,
            snapshot_result.files_transferred,
            snapshot_result.total_size,
            snapshot_result.duration_seconds,
        );
    }

    BackupResult {
        success: true,
        exit_code: EXIT_SUCCESS,
        snapshot_result: Some(snapshot_result),
        retention_result: Some(retention_result),
        error_message: None,
        incomplete_cleaned,
        queued: false,
    }
}

/// Drain the persistent queue.
///
/// Items run in FIFO order with queueing disabled (no re-enqueue
/// storms). When the destination error recurs, the failing item is
/// re-appended with its retry count bumped and draining stops.
pub fn process_queue(
    config: Option<&Config>,
    queue: &mut BackupQueue,
    max_items: usize,
) -> Vec<(QueuedBackup, BackupResult)> {
    let mut results = Vec::new();

    while results.len() < max_items {
        let Ok(Some(item)) = queue.dequeue() else {
            break;
        };

        let backup_config = match config {
            Some(config) => config.clone(),
            None => Config::new(
                PathBuf::from(&item.backup_destination),
                item.source_directories.iter().map(PathBuf::from).collect(),
            ),
        };

        let result = run_backup(
            &backup_config,
            BackupOptions {
                queue_on_dest_error: false,
                ..Default::default()
            },
        );

        let destination_error = result.exit_code == EXIT_DESTINATION_ERROR;
        results.push((item.clone(), result));

        if destination_error {
            if let Err(e) = queue.increment_retry(item) {
                Logger::warn("QUEUE_RETRY_FAILED", &[("error", &e.to_string())]);
            }
            break;
        }
    }

    results
}
