//! Observability subsystem for devbackup
//!
//! Provides structured JSON logging:
//! - One log line = one event
//! - Deterministic key ordering
//! - Explicit severity levels
//! - Synchronous, no buffering
//!
//! Logging is read-only with respect to the backup run: no side effects
//! on execution, no background threads.

mod logger;

pub use logger::{set_min_severity, Logger, Severity};

use std::path::Path;

/// Log the start of a backup run.
pub fn log_backup_start(sources: &[std::path::PathBuf], destination: &Path) {
    let sources_str = sources
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(",");
    Logger::info(
        "BACKUP_START",
        &[
            ("sources", &sources_str),
            ("destination", &destination.display().to_string()),
        ],
    );
}

/// Log successful completion of a backup run.
pub fn log_backup_complete(
    snapshot: &Path,
    files_transferred: u64,
    total_size: u64,
    duration_seconds: f64,
) {
    Logger::info(
        "BACKUP_COMPLETE",
        &[
            ("snapshot", &snapshot.display().to_string()),
            ("files_transferred", &files_transferred.to_string()),
            ("total_size", &total_size.to_string()),
            ("duration_seconds", &format!("{:.1}", duration_seconds)),
        ],
    );
}

/// Log a backup failure with the phase it occurred in.
pub fn log_backup_error(phase: &str, message: &str) {
    Logger::error("BACKUP_ERROR", &[("phase", phase), ("message", message)]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_domain_helpers_do_not_panic() {
        log_backup_start(&[PathBuf::from("/src")], Path::new("/dst"));
        log_backup_complete(Path::new("/dst/2025-01-07-103000"), 3, 1024, 1.5);
        log_backup_error("retention", "permission denied");
    }
}
