//! Symlink-safe directory traversal.
//!
//! Every walk in the crate (size/file counting, diff, search, manifest
//! construction) goes through this module. Two rules apply everywhere:
//! symbolic links are never followed, and visited directory inodes are
//! tracked so circular links terminate.

use std::collections::{BTreeMap, HashSet};
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::observability::Logger;

#[cfg(unix)]
fn inode_key(metadata: &Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (metadata.dev(), metadata.ino())
}

#[cfg(not(unix))]
fn inode_key(_metadata: &Metadata) -> (u64, u64) {
    // No stable inode identity; cycles cannot form without followed
    // symlinks, which the walker never does.
    (0, 0)
}

/// Visit every regular file under `root`, skipping symlinks and any
/// directory whose inode has already been seen.
///
/// The callback receives the file path and its (symlink_metadata)
/// metadata. Unreadable entries are skipped.
pub fn visit_files<F>(root: &Path, mut visit: F)
where
    F: FnMut(&Path, &Metadata),
{
    let mut visited: HashSet<(u64, u64)> = HashSet::new();

    let walker = WalkDir::new(root).follow_links(false).into_iter();
    let entries = walker.filter_entry(move |entry| {
        if entry.file_type().is_dir() {
            if let Ok(metadata) = entry.metadata() {
                let key = inode_key(&metadata);
                if key != (0, 0) && !visited.insert(key) {
                    Logger::warn(
                        "CIRCULAR_LINK_SKIPPED",
                        &[("path", &entry.path().display().to_string())],
                    );
                    return false;
                }
            }
        }
        true
    });

    for entry in entries.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(metadata) = entry.metadata() {
            visit(entry.path(), &metadata);
        }
    }
}

/// Total byte size and regular-file count of a directory tree.
pub fn directory_stats(root: &Path) -> (u64, u64) {
    let mut total_size = 0u64;
    let mut file_count = 0u64;
    visit_files(root, |_, metadata| {
        total_size += metadata.len();
        file_count += 1;
    });
    (total_size, file_count)
}

/// Total byte size of a directory tree.
pub fn directory_size(root: &Path) -> u64 {
    directory_stats(root).0
}

/// Map of relative path -> absolute path for every regular file under
/// `root`. Relative paths use the platform separator, matching what the
/// replicator lays down.
pub fn relative_file_map(root: &Path) -> BTreeMap<String, PathBuf> {
    let mut files = BTreeMap::new();
    visit_files(root, |path, _| {
        if let Ok(rel) = path.strip_prefix(root) {
            files.insert(rel.to_string_lossy().into_owned(), path.to_path_buf());
        }
    });
    files
}

/// Seconds since the Unix epoch for a file's mtime, as a float.
pub fn mtime_seconds(metadata: &Metadata) -> f64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
