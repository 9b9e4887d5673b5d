//! Free-space pre-flight probe.
//!
//! The orchestrator only requires the [`SpaceEstimator`] contract:
//! `estimate(dest, sources) -> (available, estimated)`. A shortfall is a
//! hard pre-condition failure. The default probe sums source tree sizes
//! with the symlink-safe walker and reads the filesystem's available
//! bytes at the destination; excludes are not modelled, so the estimate
//! is conservative.

use std::path::{Path, PathBuf};

use super::errors::{SpaceError, SpaceOpResult};
use super::available_space;
use crate::snapshot::walk;

/// Outcome of a space probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceCheck {
    pub available_bytes: u64,
    pub estimated_bytes: u64,
}

/// Free-space estimation contract consumed by the orchestrator.
pub trait SpaceEstimator {
    fn estimate(&self, destination: &Path, sources: &[PathBuf]) -> SpaceOpResult<SpaceCheck>;
}

/// Default probe: statvfs at the destination, source sizes via walking.
pub struct DiskSpaceProbe;

impl SpaceEstimator for DiskSpaceProbe {
    fn estimate(&self, destination: &Path, sources: &[PathBuf]) -> SpaceOpResult<SpaceCheck> {
        let available_bytes = available_space(destination)?;
        let estimated_bytes = sources.iter().map(|s| walk::directory_size(s)).sum();
        Ok(SpaceCheck {
            available_bytes,
            estimated_bytes,
        })
    }
}

/// Validate that the estimated replication fits in the available space.
pub fn validate_space(
    estimator: &dyn SpaceEstimator,
    destination: &Path,
    sources: &[PathBuf],
) -> SpaceOpResult<SpaceCheck> {
    let check = estimator.estimate(destination, sources)?;
    if check.estimated_bytes > check.available_bytes {
        return Err(SpaceError::Insufficient {
            destination: destination.display().to_string(),
            available: check.available_bytes,
            estimated: check.estimated_bytes,
        });
    }
    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct FixedProbe {
        available: u64,
        estimated: u64,
    }

    impl SpaceEstimator for FixedProbe {
        fn estimate(&self, _dest: &Path, _sources: &[PathBuf]) -> SpaceOpResult<SpaceCheck> {
            Ok(SpaceCheck {
                available_bytes: self.available,
                estimated_bytes: self.estimated,
            })
        }
    }

    #[test]
    fn test_shortfall_is_an_error() {
        let probe = FixedProbe {
            available: 10,
            estimated: 100,
        };
        let result = validate_space(&probe, Path::new("/dst"), &[]);
        match result {
            Err(SpaceError::Insufficient {
                available,
                estimated,
                ..
            }) => {
                assert_eq!(available, 10);
                assert_eq!(estimated, 100);
            }
            other => panic!("expected Insufficient, got {:?}", other),
        }
    }

    #[test]
    fn test_fit_passes() {
        let probe = FixedProbe {
            available: 100,
            estimated: 10,
        };
        let check = validate_space(&probe, Path::new("/dst"), &[]).unwrap();
        assert_eq!(check.available_bytes, 100);
    }

    #[cfg(unix)]
    #[test]
    fn test_disk_probe_estimates_source_sizes() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("f"), vec![0u8; 128]).unwrap();

        let check = DiskSpaceProbe
            .estimate(tmp.path(), &[source])
            .unwrap();
        assert_eq!(check.estimated_bytes, 128);
        assert!(check.available_bytes > 0);
    }
}
