//! Snapshot retention.
//!
//! Retention keeps the union of:
//! - the `hourly` most recent snapshots,
//! - the earliest snapshot of each calendar day for the last `daily`
//!   days (reckoned from the most recent snapshot's date),
//! - the earliest snapshot of each Sunday-anchored week for the last
//!   `weekly` weeks.
//!
//! A snapshot that is the link-dest target of an active run (the most
//! recent committed snapshot while any `in_progress_*` directory exists)
//! is protected from deletion regardless of policy.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

use crate::observability::Logger;
use crate::snapshot::naming::{parse_snapshot_name, IN_PROGRESS_PREFIX};
use crate::snapshot::walk;

/// Result of applying retention.
#[derive(Debug, Clone, Default)]
pub struct RetentionResult {
    pub kept_snapshots: Vec<PathBuf>,
    pub deleted_snapshots: Vec<PathBuf>,
    pub freed_bytes: u64,
}

/// Applies the hourly/daily/weekly policy to one backup root.
pub struct RetentionManager {
    destination: PathBuf,
    hourly: u32,
    daily: u32,
    weekly: u32,
}

impl RetentionManager {
    pub fn new(destination: impl Into<PathBuf>, hourly: u32, daily: u32, weekly: u32) -> Self {
        Self {
            destination: destination.into(),
            hourly,
            daily,
            weekly,
        }
    }

    fn parse_timestamp(snapshot: &Path) -> Option<NaiveDateTime> {
        snapshot
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_snapshot_name)
    }

    /// Sunday 00:00:00 of the week containing `ts`.
    fn week_start(ts: NaiveDateTime) -> NaiveDate {
        let days_since_sunday = ts.date().weekday().num_days_from_sunday() as i64;
        ts.date() - Duration::days(days_since_sunday)
    }

    fn earliest_on_day(snapshots: &[PathBuf], date: NaiveDate) -> Option<PathBuf> {
        snapshots
            .iter()
            .filter_map(|s| Self::parse_timestamp(s).map(|ts| (ts, s)))
            .filter(|(ts, _)| ts.date() == date)
            .min_by_key(|(ts, _)| *ts)
            .map(|(_, s)| s.clone())
    }

    fn earliest_in_week(snapshots: &[PathBuf], week_start: NaiveDate) -> Option<PathBuf> {
        let week_end = week_start + Duration::days(7);
        snapshots
            .iter()
            .filter_map(|s| Self::parse_timestamp(s).map(|ts| (ts, s)))
            .filter(|(ts, _)| ts.date() >= week_start && ts.date() < week_end)
            .min_by_key(|(ts, _)| *ts)
            .map(|(_, s)| s.clone())
    }

    fn list_valid_snapshots(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.destination) else {
            return Vec::new();
        };

        entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                !name.starts_with(IN_PROGRESS_PREFIX)
                    && !name.starts_with('.')
                    && parse_snapshot_name(&name).is_some()
            })
            .map(|e| e.path())
            .collect()
    }

    fn has_in_progress(&self) -> bool {
        let Ok(entries) = fs::read_dir(&self.destination) else {
            return false;
        };
        entries.flatten().any(|e| {
            e.path().is_dir()
                && e.file_name()
                    .to_string_lossy()
                    .starts_with(IN_PROGRESS_PREFIX)
        })
    }

    /// Snapshots that must survive because an active run depends on
    /// them: while any staging directory exists, the most recent
    /// committed snapshot is the link-dest target of that run.
    fn protected_snapshots(&self, snapshots: &[PathBuf]) -> HashSet<PathBuf> {
        let mut protected = HashSet::new();

        if !self.has_in_progress() {
            return protected;
        }

        // Lexicographically greatest name = most recent; the engine
        // resolves its link-dest target the same way.
        if let Some(most_recent) = snapshots
            .iter()
            .filter(|s| Self::parse_timestamp(s).is_some())
            .max_by(|a, b| a.file_name().cmp(&b.file_name()))
        {
            Logger::debug(
                "RETENTION_PROTECTED",
                &[("snapshot", &most_recent.display().to_string())],
            );
            protected.insert(most_recent.clone());
        }

        protected
    }

    /// Compute the kept set for a list of snapshots.
    pub fn get_snapshots_to_keep(&self, snapshots: &[PathBuf]) -> HashSet<PathBuf> {
        let mut parsed: Vec<(NaiveDateTime, &PathBuf)> = snapshots
            .iter()
            .filter_map(|s| Self::parse_timestamp(s).map(|ts| (ts, s)))
            .collect();

        if parsed.is_empty() {
            return HashSet::new();
        }

        // Most recent first; equal timestamps (sequence forms) fall back
        // to name order so "-02" outranks "-01".
        parsed.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.file_name().cmp(&a.1.file_name())));

        let mut to_keep: HashSet<PathBuf> = HashSet::new();

        // 1. The most recent `hourly` snapshots
        for (_, snapshot) in parsed.iter().take(self.hourly as usize) {
            to_keep.insert((*snapshot).clone());
        }

        // Policy windows are reckoned from the most recent snapshot.
        let now = parsed[0].0;

        // 2. Earliest snapshot of each of the last `daily` days
        for days_ago in 0..self.daily {
            let target = now.date() - Duration::days(days_ago as i64);
            if let Some(first) = Self::earliest_on_day(snapshots, target) {
                to_keep.insert(first);
            }
        }

        // 3. Earliest snapshot of each of the last `weekly` weeks
        let current_week = Self::week_start(now);
        for weeks_ago in 0..self.weekly {
            let target = current_week - Duration::weeks(weeks_ago as i64);
            if let Some(first) = Self::earliest_in_week(snapshots, target) {
                to_keep.insert(first);
            }
        }

        to_keep
    }

    /// Apply the policy: delete everything not kept or protected.
    ///
    /// A deletion that fails reverts that snapshot to "kept". Staging
    /// and dot-prefixed directories are never touched.
    pub fn apply_retention(&self) -> RetentionResult {
        let snapshots = self.list_valid_snapshots();

        if snapshots.is_empty() {
            return RetentionResult::default();
        }

        let to_keep = self.get_snapshots_to_keep(&snapshots);
        let protected = self.protected_snapshots(&snapshots);

        let mut result = RetentionResult::default();

        for snapshot in snapshots {
            if to_keep.contains(&snapshot) {
                result.kept_snapshots.push(snapshot);
            } else if protected.contains(&snapshot) {
                Logger::info(
                    "RETENTION_PRESERVED_LINK_DEST",
                    &[("snapshot", &snapshot.display().to_string())],
                );
                result.kept_snapshots.push(snapshot);
            } else {
                let size = walk::directory_size(&snapshot);
                match fs::remove_dir_all(&snapshot) {
                    Ok(()) => {
                        result.freed_bytes += size;
                        result.deleted_snapshots.push(snapshot);
                    }
                    Err(e) => {
                        Logger::warn(
                            "RETENTION_DELETE_FAILED",
                            &[
                                ("snapshot", &snapshot.display().to_string()),
                                ("error", &e.to_string()),
                            ],
                        );
                        result.kept_snapshots.push(snapshot);
                    }
                }
            }
        }

        result.kept_snapshots.sort_by(|a, b| b.cmp(a));
        result.deleted_snapshots.sort_by(|a, b| b.cmp(a));
        result
    }
}
