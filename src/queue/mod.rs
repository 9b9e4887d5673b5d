//! Persistent backup queue.
//!
//! A FIFO of backup requests that could not run because the destination
//! was unavailable. The queue is a JSON document under the user's cache
//! directory and survives process restarts. Every mutation rewrites the
//! whole document to a sibling temporary file and renames it into place,
//! so readers never observe a partial file. Corrupt content is treated
//! as an empty queue and rewritten on the next mutation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::Logger;

/// Queue file format version.
const QUEUE_VERSION: u32 = 1;

/// Default queue reason for destination failures.
pub const REASON_DESTINATION_UNAVAILABLE: &str = "destination_unavailable";

/// Queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Failed to save queue to {path}: {source}")]
    Save {
        path: String,
        source: std::io::Error,
    },
}

/// Result type for queue operations
pub type QueueOpResult<T> = Result<T, QueueError>;

/// Default queue path under the user's cache directory.
pub fn default_queue_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("devbackup")
        .join("queue.json")
}

/// A queued backup request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedBackup {
    pub source_directories: Vec<String>,
    pub backup_destination: String,
    /// Unix timestamp when the request was queued
    pub queued_at: f64,
    #[serde(default = "default_reason")]
    pub reason: String,
    #[serde(default)]
    pub retry_count: u32,
}

fn default_reason() -> String {
    REASON_DESTINATION_UNAVAILABLE.to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct QueueDocument {
    version: u32,
    queue: Vec<QueuedBackup>,
}

/// Persistent FIFO of deferred backup requests.
pub struct BackupQueue {
    queue_path: PathBuf,
    items: Vec<QueuedBackup>,
}

impl BackupQueue {
    /// Open (and load) the queue at the given path.
    ///
    /// A missing, empty or corrupt file yields an empty queue.
    pub fn open(queue_path: impl Into<PathBuf>) -> Self {
        let queue_path = queue_path.into();
        let items = Self::load(&queue_path);
        Self { queue_path, items }
    }

    /// Open the queue at its default cache location.
    pub fn open_default() -> Self {
        Self::open(default_queue_path())
    }

    pub fn queue_path(&self) -> &Path {
        &self.queue_path
    }

    fn load(path: &Path) -> Vec<QueuedBackup> {
        let Ok(content) = fs::read_to_string(path) else {
            return Vec::new();
        };
        if content.trim().is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<QueueDocument>(&content) {
            Ok(document) => document.queue,
            Err(e) => {
                Logger::warn(
                    "QUEUE_CORRUPT",
                    &[
                        ("path", &path.display().to_string()),
                        ("error", &e.to_string()),
                    ],
                );
                Vec::new()
            }
        }
    }

    /// Persist the whole queue atomically (temp file + rename).
    fn save(&self) -> QueueOpResult<()> {
        let save_error = |source: std::io::Error| QueueError::Save {
            path: self.queue_path.display().to_string(),
            source,
        };

        if let Some(parent) = self.queue_path.parent() {
            fs::create_dir_all(parent).map_err(save_error)?;
        }

        let document = QueueDocument {
            version: QUEUE_VERSION,
            queue: self.items.clone(),
        };
        let json = serde_json::to_string_pretty(&document).map_err(|e| QueueError::Save {
            path: self.queue_path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        let temp_path = self.queue_path.with_extension("tmp");
        fs::write(&temp_path, json).map_err(save_error)?;
        fs::rename(&temp_path, &self.queue_path).map_err(save_error)?;
        Ok(())
    }

    /// Append a backup request to the tail of the queue.
    pub fn enqueue(
        &mut self,
        source_directories: &[PathBuf],
        backup_destination: &Path,
        reason: &str,
    ) -> QueueOpResult<QueuedBackup> {
        let item = QueuedBackup {
            source_directories: source_directories
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            backup_destination: backup_destination.display().to_string(),
            queued_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
            reason: reason.to_string(),
            retry_count: 0,
        };

        self.items.push(item.clone());
        self.save()?;

        Logger::info(
            "QUEUE_ENQUEUED",
            &[
                ("destination", &item.backup_destination),
                ("reason", reason),
            ],
        );
        Ok(item)
    }

    /// Remove and return the oldest request.
    pub fn dequeue(&mut self) -> QueueOpResult<Option<QueuedBackup>> {
        if self.items.is_empty() {
            return Ok(None);
        }
        let item = self.items.remove(0);
        self.save()?;
        Ok(Some(item))
    }

    /// The oldest request, without removing it.
    pub fn peek(&self) -> Option<&QueuedBackup> {
        self.items.first()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    /// All queued requests, oldest first.
    pub fn get_all(&self) -> &[QueuedBackup] {
        &self.items
    }

    /// Remove every request. Returns the number cleared.
    pub fn clear(&mut self) -> QueueOpResult<usize> {
        let count = self.items.len();
        self.items.clear();
        self.save()?;
        Ok(count)
    }

    /// Bump an item's retry count and re-append it at the tail.
    pub fn increment_retry(&mut self, mut item: QueuedBackup) -> QueueOpResult<()> {
        item.retry_count += 1;
        Logger::debug(
            "QUEUE_RETRY",
            &[
                ("destination", &item.backup_destination),
                ("retry_count", &item.retry_count.to_string()),
            ],
        );
        self.items.push(item);
        self.save()
    }

    /// Remove all requests for a destination. Returns the number removed.
    pub fn remove_by_destination(&mut self, destination: &Path) -> QueueOpResult<usize> {
        let dest_str = destination.display().to_string();
        let before = self.items.len();
        self.items.retain(|item| item.backup_destination != dest_str);
        let removed = before - self.items.len();
        if removed > 0 {
            self.save()?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn queue_in(tmp: &TempDir) -> BackupQueue {
        BackupQueue::open(tmp.path().join("queue.json"))
    }

    #[test]
    fn test_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let queue = queue_in(&tmp);
        assert!(queue.is_empty());
        assert_eq!(queue.size(), 0);
        assert!(queue.peek().is_none());
    }

    #[test]
    fn test_fifo_order() {
        let tmp = TempDir::new().unwrap();
        let mut queue = queue_in(&tmp);

        queue
            .enqueue(&[PathBuf::from("/s1")], Path::new("/d1"), "destination_unavailable")
            .unwrap();
        queue
            .enqueue(&[PathBuf::from("/s2")], Path::new("/d2"), "destination_unavailable")
            .unwrap();

        assert_eq!(queue.peek().unwrap().backup_destination, "/d1");
        assert_eq!(
            queue.dequeue().unwrap().unwrap().backup_destination,
            "/d1"
        );
        assert_eq!(
            queue.dequeue().unwrap().unwrap().backup_destination,
            "/d2"
        );
        assert!(queue.dequeue().unwrap().is_none());
    }

    #[test]
    fn test_persists_across_instances() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("queue.json");

        {
            let mut queue = BackupQueue::open(&path);
            queue
                .enqueue(&[PathBuf::from("/src")], Path::new("/dst"), "destination_unavailable")
                .unwrap();
        }

        let mut reopened = BackupQueue::open(&path);
        assert_eq!(reopened.size(), 1);
        let item = reopened.dequeue().unwrap().unwrap();
        assert_eq!(item.source_directories, vec!["/src"]);
        assert_eq!(item.backup_destination, "/dst");
        assert!(item.queued_at > 0.0);
    }

    #[test]
    fn test_wire_format() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("queue.json");
        let mut queue = BackupQueue::open(&path);
        queue
            .enqueue(&[PathBuf::from("/src")], Path::new("/dst"), "destination_unavailable")
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["version"], 1);
        assert!(parsed["queue"].is_array());
        let entry = &parsed["queue"][0];
        assert_eq!(entry["backup_destination"], "/dst");
        assert_eq!(entry["reason"], "destination_unavailable");
        assert_eq!(entry["retry_count"], 0);
        assert!(entry["queued_at"].is_f64());
    }

    #[test]
    fn test_corrupt_file_treated_as_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("queue.json");
        fs::write(&path, "{{{ not json").unwrap();

        let mut queue = BackupQueue::open(&path);
        assert!(queue.is_empty());

        // Next mutation rewrites the file into valid form
        queue
            .enqueue(&[PathBuf::from("/s")], Path::new("/d"), "destination_unavailable")
            .unwrap();
        let reopened = BackupQueue::open(&path);
        assert_eq!(reopened.size(), 1);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("queue.json");
        let mut queue = BackupQueue::open(&path);
        queue
            .enqueue(&[PathBuf::from("/s")], Path::new("/d"), "destination_unavailable")
            .unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_increment_retry_reappends_at_tail() {
        let tmp = TempDir::new().unwrap();
        let mut queue = queue_in(&tmp);
        queue
            .enqueue(&[PathBuf::from("/s1")], Path::new("/d1"), "destination_unavailable")
            .unwrap();
        queue
            .enqueue(&[PathBuf::from("/s2")], Path::new("/d2"), "destination_unavailable")
            .unwrap();

        let first = queue.dequeue().unwrap().unwrap();
        queue.increment_retry(first).unwrap();

        assert_eq!(queue.size(), 2);
        assert_eq!(queue.peek().unwrap().backup_destination, "/d2");
        let requeued = &queue.get_all()[1];
        assert_eq!(requeued.backup_destination, "/d1");
        assert_eq!(requeued.retry_count, 1);
    }

    #[test]
    fn test_remove_by_destination() {
        let tmp = TempDir::new().unwrap();
        let mut queue = queue_in(&tmp);
        queue
            .enqueue(&[PathBuf::from("/s")], Path::new("/keep"), "destination_unavailable")
            .unwrap();
        queue
            .enqueue(&[PathBuf::from("/s")], Path::new("/drop"), "destination_unavailable")
            .unwrap();
        queue
            .enqueue(&[PathBuf::from("/s")], Path::new("/drop"), "destination_unavailable")
            .unwrap();

        let removed = queue.remove_by_destination(Path::new("/drop")).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.peek().unwrap().backup_destination, "/keep");
    }

    #[test]
    fn test_clear() {
        let tmp = TempDir::new().unwrap();
        let mut queue = queue_in(&tmp);
        queue
            .enqueue(&[PathBuf::from("/s")], Path::new("/d"), "destination_unavailable")
            .unwrap();
        assert_eq!(queue.clear().unwrap(), 1);
        assert!(queue.is_empty());
        assert!(BackupQueue::open(queue.queue_path()).is_empty());
    }
}
