//! Restore files or trees out of a snapshot.
//!
//! The destination is explicit, or else the original location derived
//! from the first configured source root. Directory restores replace the
//! destination tree; file restores preserve permissions and mtime.

use std::fs;
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::observability::Logger;

/// Restore `source_path` (relative to the snapshot root) to
/// `destination`, or to its original location under the first source
/// directory when no destination is given. Returns `true` on success.
pub fn restore(
    snapshot: &Path,
    source_path: &str,
    destination: Option<&Path>,
    source_directories: &[PathBuf],
) -> bool {
    if !snapshot.is_dir() {
        return false;
    }

    let source = snapshot.join(source_path);
    if !source.exists() {
        return false;
    }

    let destination: PathBuf = match destination {
        Some(dest) => dest.to_path_buf(),
        None => {
            // The snapshot mirrors the source contents; the first source
            // directory is the restore base.
            let Some(first) = source_directories.first() else {
                return false;
            };
            first.join(source_path)
        }
    };

    let outcome = if source.is_dir() {
        restore_dir(&source, &destination)
    } else {
        restore_file(&source, &destination)
    };

    match outcome {
        Ok(()) => true,
        Err(e) => {
            Logger::error(
                "RESTORE_FAILED",
                &[
                    ("source", &source.display().to_string()),
                    ("destination", &destination.display().to_string()),
                    ("error", &e.to_string()),
                ],
            );
            false
        }
    }
}

fn restore_dir(source: &Path, destination: &Path) -> std::io::Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    // Overwrite semantics: drop whatever is there first.
    if destination.exists() {
        fs::remove_dir_all(destination)?;
    }
    copy_dir_recursive(source, destination)
}

fn restore_file(source: &Path, destination: &Path) -> std::io::Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    copy_file_with_metadata(source, destination)
}

fn copy_dir_recursive(source: &Path, destination: &Path) -> std::io::Result<()> {
    fs::create_dir_all(destination)?;

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = destination.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            copy_file_with_metadata(&src_path, &dst_path)?;
        }
        // Symlinks and other file types are skipped
    }

    Ok(())
}

// fs::copy carries permissions; mtime needs to be carried explicitly.
fn copy_file_with_metadata(source: &Path, destination: &Path) -> std::io::Result<()> {
    fs::copy(source, destination)?;
    let metadata = fs::metadata(source)?;
    filetime::set_file_mtime(destination, FileTime::from_last_modification_time(&metadata))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_snapshot(root: &Path) -> PathBuf {
        let snapshot = root.join("2025-01-07-120000");
        fs::create_dir_all(snapshot.join("project/sub")).unwrap();
        fs::write(snapshot.join("project/a.txt"), b"hello").unwrap();
        fs::write(snapshot.join("project/sub/b.txt"), b"world").unwrap();
        snapshot
    }

    #[test]
    fn test_restore_file_to_explicit_destination() {
        let tmp = TempDir::new().unwrap();
        let snapshot = setup_snapshot(tmp.path());
        let dest = tmp.path().join("restored/a.txt");

        assert!(restore(&snapshot, "project/a.txt", Some(&dest), &[]));
        assert_eq!(fs::read(&dest).unwrap(), b"hello");
    }

    #[test]
    fn test_restore_preserves_mtime() {
        let tmp = TempDir::new().unwrap();
        let snapshot = setup_snapshot(tmp.path());
        let mtime = FileTime::from_unix_time(1_700_000_000, 0);
        filetime::set_file_mtime(snapshot.join("project/a.txt"), mtime).unwrap();

        let dest = tmp.path().join("out.txt");
        assert!(restore(&snapshot, "project/a.txt", Some(&dest), &[]));
        let restored = FileTime::from_last_modification_time(&fs::metadata(&dest).unwrap());
        assert_eq!(restored.unix_seconds(), 1_700_000_000);
    }

    #[test]
    fn test_restore_directory_replaces_existing_tree() {
        let tmp = TempDir::new().unwrap();
        let snapshot = setup_snapshot(tmp.path());
        let dest = tmp.path().join("restored");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale.txt"), b"stale").unwrap();

        assert!(restore(&snapshot, "project", Some(&dest), &[]));
        assert!(dest.join("a.txt").exists());
        assert!(dest.join("sub/b.txt").exists());
        assert!(!dest.join("stale.txt").exists());
    }

    #[test]
    fn test_restore_to_original_location() {
        let tmp = TempDir::new().unwrap();
        let snapshot = setup_snapshot(tmp.path());
        let source_root = tmp.path().join("home");
        fs::create_dir_all(&source_root).unwrap();

        assert!(restore(
            &snapshot,
            "project/a.txt",
            None,
            &[source_root.clone()]
        ));
        assert_eq!(fs::read(source_root.join("project/a.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_restore_without_destination_or_sources_fails() {
        let tmp = TempDir::new().unwrap();
        let snapshot = setup_snapshot(tmp.path());
        assert!(!restore(&snapshot, "project/a.txt", None, &[]));
    }

    #[test]
    fn test_restore_missing_path_fails() {
        let tmp = TempDir::new().unwrap();
        let snapshot = setup_snapshot(tmp.path());
        let dest = tmp.path().join("x");
        assert!(!restore(&snapshot, "project/absent.txt", Some(&dest), &[]));
        assert!(!restore(Path::new("/no/such/snapshot"), "a", Some(&dest), &[]));
    }
}
