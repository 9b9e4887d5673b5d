//! File search across snapshots.
//!
//! Matches basenames against a glob pattern, walking each snapshot with
//! the shared symlink-safe walker.

use std::path::PathBuf;

use chrono::{DateTime, Local};

use super::walk;

/// A single search match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    /// Name of the snapshot the match was found in
    pub snapshot: String,
    /// Path relative to the snapshot root
    pub path: String,
    pub size: u64,
    /// Local mtime, ISO 8601
    pub modified: String,
}

/// Search the given snapshots for files whose basename matches `pattern`.
///
/// Literal patterns (no glob metacharacters) match exact file names.
pub fn search(snapshots: &[PathBuf], pattern: &str) -> Vec<SearchHit> {
    let Ok(pattern) = glob::Pattern::new(pattern) else {
        return Vec::new();
    };

    let mut hits = Vec::new();

    for snapshot in snapshots {
        let snapshot_name = snapshot
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        walk::visit_files(snapshot, |path, metadata| {
            let Some(file_name) = path.file_name().map(|n| n.to_string_lossy()) else {
                return;
            };
            if !pattern.matches(&file_name) {
                return;
            }
            let Ok(rel) = path.strip_prefix(snapshot) else {
                return;
            };

            let modified = metadata
                .modified()
                .ok()
                .map(|mtime| {
                    DateTime::<Local>::from(mtime)
                        .format("%Y-%m-%dT%H:%M:%S")
                        .to_string()
                })
                .unwrap_or_default();

            hits.push(SearchHit {
                snapshot: snapshot_name.clone(),
                path: rel.to_string_lossy().into_owned(),
                size: metadata.len(),
                modified,
            });
        });
    }

    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn build_snapshots(root: &std::path::Path) -> Vec<PathBuf> {
        let first = root.join("2025-01-06-120000");
        let second = root.join("2025-01-07-120000");
        fs::create_dir_all(first.join("notes")).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(first.join("notes/todo.md"), b"todo").unwrap();
        fs::write(first.join("main.rs"), b"fn main() {}").unwrap();
        fs::write(second.join("todo.md"), b"done").unwrap();
        vec![first, second]
    }

    #[test]
    fn test_glob_matches_basenames_across_snapshots() {
        let tmp = TempDir::new().unwrap();
        let snapshots = build_snapshots(tmp.path());

        let hits = search(&snapshots, "*.md");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|h| h.snapshot == "2025-01-06-120000"));
        assert!(hits.iter().any(|h| h.snapshot == "2025-01-07-120000"));
    }

    #[test]
    fn test_literal_pattern_matches_exact_name() {
        let tmp = TempDir::new().unwrap();
        let snapshots = build_snapshots(tmp.path());

        let hits = search(&snapshots, "main.rs");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "main.rs");
        assert_eq!(hits[0].size, 12);
        assert!(!hits[0].modified.is_empty());
    }

    #[test]
    fn test_relative_paths_reported() {
        let tmp = TempDir::new().unwrap();
        let snapshots = build_snapshots(tmp.path());

        let hits = search(&snapshots[..1], "todo.md");
        let sep = std::path::MAIN_SEPARATOR;
        assert_eq!(hits[0].path, format!("notes{}todo.md", sep));
    }

    #[test]
    fn test_no_match() {
        let tmp = TempDir::new().unwrap();
        let snapshots = build_snapshots(tmp.path());
        assert!(search(&snapshots, "*.jpeg").is_empty());
    }

    #[test]
    fn test_invalid_pattern_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        let snapshots = build_snapshots(tmp.path());
        assert!(search(&snapshots, "[").is_empty());
    }
}
