//! Persistent queue invariant tests
//!
//! Tests for invariants:
//! - Queue FIFO and persistence: items dequeue in enqueue order, across
//!   process restarts (modelled as fresh instances over the same file)
//! - Atomic mutation: the queue file always parses, never truncated
//!
//! Plus the destination-absent scenario: a run against a missing
//! destination queues itself, releases the lock and leaves no staging;
//! draining after the destination returns empties the queue.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use devbackup::backup::{process_queue, run_backup, BackupOptions, EXIT_DESTINATION_ERROR};
use devbackup::config::Config;
use devbackup::queue::{BackupQueue, REASON_DESTINATION_UNAVAILABLE};

fn write_fake_rsync(dir: &Path) -> PathBuf {
    let script = r#"#!/bin/sh
dest=""
for arg in "$@"; do
  case "$arg" in
    -*) ;;
    *) dest="$arg" ;;
  esac
done
for arg in "$@"; do
  case "$arg" in
    -*) ;;
    *)
      if [ "$arg" != "$dest" ]; then
        cp -a "$arg." "$dest"
      fi
      ;;
  esac
done
echo "Number of files: 1"
echo "Number of regular files transferred: 1"
echo "sent 5 bytes  received 0 bytes"
exit 0
"#;
    let path = dir.join("fake-rsync");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn test_config(tmp: &TempDir) -> Config {
    let destination = tmp.path().join("backups");
    let source = tmp.path().join("src");
    fs::create_dir_all(&destination).unwrap();
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("a.txt"), b"hello").unwrap();

    let mut config = Config::new(destination, vec![source]);
    config.queue_path = tmp.path().join("queue.json");
    config.lock_path = tmp.path().join("devbackup.pid");
    config.retry.base_delay_seconds = 0.01;
    config.rsync_program = write_fake_rsync(tmp.path());
    config
}

/// FIFO order survives process restarts.
#[test]
fn test_fifo_across_restarts() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("queue.json");

    {
        let mut queue = BackupQueue::open(&path);
        for i in 0..3 {
            queue
                .enqueue(
                    &[PathBuf::from(format!("/src{}", i))],
                    Path::new(&format!("/dst{}", i)),
                    REASON_DESTINATION_UNAVAILABLE,
                )
                .unwrap();
        }
    }

    let mut reopened = BackupQueue::open(&path);
    for i in 0..3 {
        let item = reopened.dequeue().unwrap().unwrap();
        assert_eq!(item.backup_destination, format!("/dst{}", i));
    }
    assert!(reopened.is_empty());
}

/// Every durably-written state of the queue file parses as a complete
/// document.
#[test]
fn test_queue_file_always_parses() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("queue.json");
    let mut queue = BackupQueue::open(&path);

    for i in 0..5 {
        queue
            .enqueue(
                &[PathBuf::from("/src")],
                Path::new(&format!("/dst{}", i)),
                REASON_DESTINATION_UNAVAILABLE,
            )
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["version"], 1);
        assert_eq!(parsed["queue"].as_array().unwrap().len(), i + 1);
    }

    queue.dequeue().unwrap();
    let content = fs::read_to_string(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(parsed["queue"].as_array().unwrap().len(), 4);
}

/// Scenario: destination absent with queueing enabled, then drained
/// after the destination returns.
#[test]
fn test_destination_absent_queues_then_drains() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    config.backup_destination = tmp.path().join("removable");

    // Destination away: the run queues itself
    let result = run_backup(&config, BackupOptions::default());
    assert_eq!(result.exit_code, EXIT_DESTINATION_ERROR);
    assert!(result.queued);
    assert!(!config.lock_path.exists(), "lock must be released");

    let queue = BackupQueue::open(&config.queue_path);
    assert_eq!(queue.size(), 1);
    assert_eq!(
        queue.peek().unwrap().backup_destination,
        config.backup_destination.display().to_string()
    );
    drop(queue);

    // No staging directory exists anywhere
    assert!(!config.backup_destination.exists());

    // Destination returns: draining runs the queued backup
    fs::create_dir_all(&config.backup_destination).unwrap();
    let mut queue = BackupQueue::open(&config.queue_path);
    let results = process_queue(Some(&config), &mut queue, 10);

    assert_eq!(results.len(), 1);
    assert!(results[0].1.success, "error: {:?}", results[0].1.error_message);
    assert!(queue.is_empty());

    // The drained run committed a real snapshot
    let snapshots: Vec<_> = fs::read_dir(&config.backup_destination)
        .unwrap()
        .flatten()
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .collect();
    assert_eq!(snapshots.len(), 1);
}

/// Draining stops at the first recurring destination error and bumps
/// the failing item's retry count at the tail.
#[test]
fn test_drain_stops_and_requeues_on_recurring_error() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    config.backup_destination = tmp.path().join("still-away");

    let mut queue = BackupQueue::open(&config.queue_path);
    for _ in 0..3 {
        queue
            .enqueue(
                &config.source_directories,
                &config.backup_destination,
                REASON_DESTINATION_UNAVAILABLE,
            )
            .unwrap();
    }

    let results = process_queue(Some(&config), &mut queue, 10);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].1.exit_code, EXIT_DESTINATION_ERROR);

    // Two untouched plus the re-queued one
    assert_eq!(queue.size(), 3);
    let items = queue.get_all();
    assert_eq!(items[0].retry_count, 0);
    assert_eq!(items[2].retry_count, 1);
}
