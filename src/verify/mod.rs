//! Integrity verification for snapshots.
//!
//! Each committed snapshot carries a manifest of SHA-256 checksums.
//! Construction walks the snapshot (symlink-safe) and hashes every
//! regular file except the manifest itself; verification recomputes the
//! hashes and reports missing, corrupted and unreadable files.
//! Verification is read-only and side-effect-free.

mod checksum;
mod errors;
mod manifest;

pub use checksum::{compute_file_sha256, compute_sha256};
pub use errors::{VerifyError, VerifyErrorCode, VerifyResult};
pub use manifest::{FileChecksum, Manifest, MANIFEST_FILENAME};

use std::path::Path;

use chrono::{SecondsFormat, Utc};

use crate::snapshot::walk;

/// Result of verifying a snapshot against its manifest.
#[derive(Debug, Clone, Default)]
pub struct VerificationResult {
    pub success: bool,
    pub files_verified: u64,
    pub files_failed: u64,
    pub missing_files: Vec<String>,
    pub corrupted_files: Vec<String>,
    pub errors: Vec<String>,
}

/// Builds and checks snapshot manifests.
pub struct IntegrityVerifier;

impl IntegrityVerifier {
    /// Build a manifest for a snapshot directory.
    ///
    /// Walks the snapshot without following symlinks, skipping the
    /// manifest file itself; unreadable files are skipped. Each entry
    /// records the relative path, size, mtime and streamed SHA-256.
    pub fn create_manifest(snapshot_path: &Path) -> Manifest {
        let mut checksums: Vec<FileChecksum> = Vec::new();
        let mut total_size = 0u64;

        for (relative, absolute) in walk::relative_file_map(snapshot_path) {
            if Path::new(&relative)
                .file_name()
                .map(|n| n == MANIFEST_FILENAME)
                .unwrap_or(false)
            {
                continue;
            }

            let Ok(metadata) = std::fs::symlink_metadata(&absolute) else {
                continue;
            };
            let Ok(sha256) = compute_file_sha256(&absolute) else {
                continue;
            };

            total_size += metadata.len();
            checksums.push(FileChecksum {
                path: relative,
                size: metadata.len(),
                mtime: walk::mtime_seconds(&metadata),
                sha256,
            });
        }

        Manifest {
            snapshot_name: snapshot_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            file_count: checksums.len() as u64,
            total_size,
            checksums,
        }
    }

    /// Persist a manifest into its snapshot directory (atomic rename).
    pub fn save_manifest(manifest: &Manifest, snapshot_path: &Path) -> VerifyResult<()> {
        manifest.save(snapshot_path)
    }

    /// Load the manifest of a snapshot, if present and parseable.
    pub fn load_manifest(snapshot_path: &Path) -> Option<Manifest> {
        Manifest::load(snapshot_path)
    }

    /// Verify a snapshot against its manifest.
    ///
    /// An absent manifest fails with the single error
    /// `"Manifest file not found"`. Entries may be filtered by a glob
    /// pattern over their relative paths.
    pub fn verify_snapshot(snapshot_path: &Path, pattern: Option<&str>) -> VerificationResult {
        let Some(manifest) = Self::load_manifest(snapshot_path) else {
            return VerificationResult {
                success: false,
                errors: vec!["Manifest file not found".to_string()],
                ..Default::default()
            };
        };

        let filter = pattern.and_then(|p| glob::Pattern::new(p).ok());

        let mut result = VerificationResult::default();

        for entry in &manifest.checksums {
            if let Some(filter) = &filter {
                if !filter.matches(&entry.path) {
                    continue;
                }
            }

            let file_path = snapshot_path.join(&entry.path);

            if !file_path.exists() {
                result.missing_files.push(entry.path.clone());
                continue;
            }

            match compute_file_sha256(&file_path) {
                Ok(current) => {
                    if current != entry.sha256 {
                        result.corrupted_files.push(entry.path.clone());
                    } else {
                        result.files_verified += 1;
                    }
                }
                Err(e) => {
                    result
                        .errors
                        .push(format!("Error reading {}: {}", entry.path, e));
                }
            }
        }

        result.files_failed = (result.missing_files.len() + result.corrupted_files.len()) as u64;
        result.success = result.missing_files.is_empty()
            && result.corrupted_files.is_empty()
            && result.errors.is_empty();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn build_snapshot(root: &Path) {
        fs::create_dir_all(root.join("dir")).unwrap();
        fs::write(root.join("a.txt"), b"hello").unwrap();
        fs::write(root.join("dir/b.bin"), [0u8, 1u8]).unwrap();
    }

    #[test]
    fn test_create_manifest_lists_every_file_once() {
        let tmp = TempDir::new().unwrap();
        build_snapshot(tmp.path());

        let manifest = IntegrityVerifier::create_manifest(tmp.path());
        assert_eq!(manifest.file_count, 2);
        assert_eq!(manifest.total_size, 7);

        let mut paths: Vec<String> = manifest.checksums.iter().map(|c| c.path.clone()).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "a.txt".to_string(),
                format!("dir{}b.bin", std::path::MAIN_SEPARATOR),
            ]
        );
        assert_eq!(manifest.checksums.len(), 2);
    }

    #[test]
    fn test_manifest_excludes_itself() {
        let tmp = TempDir::new().unwrap();
        build_snapshot(tmp.path());

        let manifest = IntegrityVerifier::create_manifest(tmp.path());
        IntegrityVerifier::save_manifest(&manifest, tmp.path()).unwrap();

        let rebuilt = IntegrityVerifier::create_manifest(tmp.path());
        assert_eq!(rebuilt.file_count, 2);
        assert!(rebuilt
            .checksums
            .iter()
            .all(|c| !c.path.contains(MANIFEST_FILENAME)));
    }

    #[test]
    fn test_manifest_checksums_are_correct() {
        let tmp = TempDir::new().unwrap();
        build_snapshot(tmp.path());

        let manifest = IntegrityVerifier::create_manifest(tmp.path());
        let a = manifest
            .checksums
            .iter()
            .find(|c| c.path == "a.txt")
            .unwrap();
        assert_eq!(a.sha256, compute_sha256(b"hello"));
        assert_eq!(a.size, 5);
        assert!(a.mtime > 0.0);
    }

    #[test]
    fn test_verify_clean_snapshot() {
        let tmp = TempDir::new().unwrap();
        build_snapshot(tmp.path());
        let manifest = IntegrityVerifier::create_manifest(tmp.path());
        IntegrityVerifier::save_manifest(&manifest, tmp.path()).unwrap();

        let result = IntegrityVerifier::verify_snapshot(tmp.path(), None);
        assert!(result.success);
        assert_eq!(result.files_verified, 2);
        assert_eq!(result.files_failed, 0);
    }

    #[test]
    fn test_verify_detects_corruption() {
        let tmp = TempDir::new().unwrap();
        build_snapshot(tmp.path());
        let manifest = IntegrityVerifier::create_manifest(tmp.path());
        IntegrityVerifier::save_manifest(&manifest, tmp.path()).unwrap();

        fs::write(tmp.path().join("a.txt"), b"HELLO").unwrap();

        let result = IntegrityVerifier::verify_snapshot(tmp.path(), None);
        assert!(!result.success);
        assert_eq!(result.corrupted_files, vec!["a.txt".to_string()]);
        assert_eq!(result.files_failed, 1);
    }

    #[test]
    fn test_verify_detects_missing_file() {
        let tmp = TempDir::new().unwrap();
        build_snapshot(tmp.path());
        let manifest = IntegrityVerifier::create_manifest(tmp.path());
        IntegrityVerifier::save_manifest(&manifest, tmp.path()).unwrap();

        fs::remove_file(tmp.path().join("a.txt")).unwrap();

        let result = IntegrityVerifier::verify_snapshot(tmp.path(), None);
        assert!(!result.success);
        assert_eq!(result.missing_files, vec!["a.txt".to_string()]);
    }

    #[test]
    fn test_verify_without_manifest() {
        let tmp = TempDir::new().unwrap();
        let result = IntegrityVerifier::verify_snapshot(tmp.path(), None);
        assert!(!result.success);
        assert_eq!(result.errors, vec!["Manifest file not found".to_string()]);
        assert_eq!(result.files_verified, 0);
    }

    #[test]
    fn test_verify_with_pattern_filter() {
        let tmp = TempDir::new().unwrap();
        build_snapshot(tmp.path());
        let manifest = IntegrityVerifier::create_manifest(tmp.path());
        IntegrityVerifier::save_manifest(&manifest, tmp.path()).unwrap();

        // Corrupt the file the filter skips; verification still succeeds.
        fs::write(tmp.path().join("dir/b.bin"), [9u8, 9u8]).unwrap();
        let result = IntegrityVerifier::verify_snapshot(tmp.path(), Some("*.txt"));
        assert!(result.success);
        assert_eq!(result.files_verified, 1);
    }

    #[test]
    fn test_verification_is_read_only() {
        let tmp = TempDir::new().unwrap();
        build_snapshot(tmp.path());
        let manifest = IntegrityVerifier::create_manifest(tmp.path());
        IntegrityVerifier::save_manifest(&manifest, tmp.path()).unwrap();

        let before = compute_file_sha256(&tmp.path().join("a.txt")).unwrap();
        let _ = IntegrityVerifier::verify_snapshot(tmp.path(), None);
        let after = compute_file_sha256(&tmp.path().join("a.txt")).unwrap();
        assert_eq!(before, after);
    }
}
