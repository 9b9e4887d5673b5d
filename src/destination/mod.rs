//! Backup destination pre-flight checks.
//!
//! Destinations on developer machines come and go (removable drives), so
//! a run starts by checking that the destination volume is mounted, the
//! directory exists and a real write succeeds. Free space is probed
//! separately through the [`SpaceEstimator`] contract.

mod errors;
mod space;

pub use errors::{DestinationError, DestinationResult, SpaceError, SpaceOpResult};
pub use space::{validate_space, DiskSpaceProbe, SpaceCheck, SpaceEstimator};

use std::fs;
use std::path::Path;

/// Name of the throwaway file used for the writability probe.
const WRITE_TEST_FILENAME: &str = ".devbackup_write_test";

/// Validate that the backup destination is available and writable.
///
/// Checks, in order: volume mounted (for removable-media paths),
/// existence, is-a-directory, writability.
pub fn validate_destination(destination: &Path) -> DestinationResult<()> {
    if !is_volume_mounted(destination) {
        return Err(DestinationError::NotMounted(
            destination.display().to_string(),
        ));
    }

    if !destination.exists() {
        return Err(DestinationError::NotFound(
            destination.display().to_string(),
        ));
    }

    if !destination.is_dir() {
        return Err(DestinationError::NotADirectory(
            destination.display().to_string(),
        ));
    }

    if !is_writable(destination) {
        return Err(DestinationError::NotWritable(
            destination.display().to_string(),
        ));
    }

    Ok(())
}

/// Check whether a path is on a mounted volume.
///
/// Removable drives mount under `/Volumes/<name>`; for such paths the
/// mount-point directory must exist. Anything else is assumed local.
pub fn is_volume_mounted(path: &Path) -> bool {
    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let path_str = resolved.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("/Volumes/") {
        if let Some(volume_name) = rest.split('/').next() {
            let volume_path = Path::new("/Volumes").join(volume_name);
            return volume_path.is_dir();
        }
    }

    true
}

/// Check writability by actually creating and removing a probe file.
pub fn is_writable(path: &Path) -> bool {
    let test_file = path.join(WRITE_TEST_FILENAME);
    match fs::write(&test_file, b"") {
        Ok(()) => {
            let _ = fs::remove_file(&test_file);
            true
        }
        Err(_) => false,
    }
}

/// Available space in bytes at the given path.
#[cfg(unix)]
pub fn available_space(path: &Path) -> DestinationResult<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|e| {
        DestinationError::SpaceUnavailable {
            path: path.display().to_string(),
            detail: e.to_string(),
        }
    })?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if result != 0 {
        return Err(DestinationError::SpaceUnavailable {
            path: path.display().to_string(),
            detail: std::io::Error::last_os_error().to_string(),
        });
    }

    // Blocks available to unprivileged users times the fragment size.
    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
pub fn available_space(path: &Path) -> DestinationResult<u64> {
    Err(DestinationError::SpaceUnavailable {
        path: path.display().to_string(),
        detail: "no space probe on this platform".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_valid_destination() {
        let tmp = TempDir::new().unwrap();
        validate_destination(tmp.path()).unwrap();
        // The probe file must not linger
        assert!(!tmp.path().join(WRITE_TEST_FILENAME).exists());
    }

    #[test]
    fn test_missing_destination() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("absent");
        match validate_destination(&missing) {
            Err(DestinationError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_file_destination_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file");
        fs::write(&file, b"x").unwrap();
        match validate_destination(&file) {
            Err(DestinationError::NotADirectory(_)) => {}
            other => panic!("expected NotADirectory, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_unwritable_destination() {
        use std::os::unix::fs::PermissionsExt;
        // Running as root makes everything writable; skip there.
        if unsafe { libc::geteuid() } == 0 {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("readonly");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).unwrap();

        match validate_destination(&dir) {
            Err(DestinationError::NotWritable(_)) => {}
            other => panic!("expected NotWritable, got {:?}", other),
        }

        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_non_volume_paths_count_as_mounted() {
        assert!(is_volume_mounted(Path::new("/tmp")));
        assert!(is_volume_mounted(Path::new("relative/path")));
    }

    #[test]
    fn test_unmounted_volume_path() {
        assert!(!is_volume_mounted(Path::new(
            "/Volumes/devbackup-test-no-such-volume/backups"
        )));
    }

    #[cfg(unix)]
    #[test]
    fn test_available_space() {
        let tmp = TempDir::new().unwrap();
        let available = available_space(tmp.path()).unwrap();
        assert!(available > 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_available_space_missing_path() {
        assert!(available_space(Path::new("/no/such/path/anywhere")).is_err());
    }
}
