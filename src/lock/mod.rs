//! Process-level locking via a pidfile.
//!
//! A single exclusive lock guards the whole run: two concurrent runs
//! against the same installation are impossible. The pidfile contains
//! the holder's pid; a pidfile whose pid is no longer alive is treated
//! as stale and taken over. Release is idempotent and must happen on
//! every exit path.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use thiserror::Error;

use crate::observability::Logger;

/// Lock errors
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Backup already running (pid {pid})")]
    Held { pid: u32 },

    #[error("Failed to create lock file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Check whether a process with the given pid is alive.
///
/// EPERM means the process exists but belongs to someone else, which
/// still counts as alive.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    let result = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if result == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> bool {
    // No cheap liveness probe; treat the lock as held.
    true
}

/// Pidfile-backed exclusive lock.
pub struct LockManager {
    lock_path: PathBuf,
}

impl LockManager {
    pub fn new(lock_path: impl Into<PathBuf>) -> Self {
        Self {
            lock_path: lock_path.into(),
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Acquire the lock for this process.
    ///
    /// An existing pidfile with a live holder fails with
    /// [`LockError::Held`]; a stale one (dead or unparseable pid) is
    /// taken over.
    pub fn acquire(&self) -> LockResult<()> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| LockError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        match self.try_create_exclusive() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                match self.holder_pid() {
                    Some(pid) if pid_alive(pid) => Err(LockError::Held { pid }),
                    _ => {
                        // Stale pidfile: the recorded process is gone.
                        Logger::warn(
                            "LOCK_STALE_TAKEOVER",
                            &[("path", &self.lock_path.display().to_string())],
                        );
                        let _ = fs::remove_file(&self.lock_path);
                        self.try_create_exclusive().map_err(|e| LockError::Io {
                            path: self.lock_path.display().to_string(),
                            source: e,
                        })
                    }
                }
            }
            Err(e) => Err(LockError::Io {
                path: self.lock_path.display().to_string(),
                source: e,
            }),
        }
    }

    fn try_create_exclusive(&self) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)?;
        write!(file, "{}", process::id())?;
        Ok(())
    }

    /// Release the lock. Idempotent: a missing pidfile is fine.
    pub fn release(&self) {
        let _ = fs::remove_file(&self.lock_path);
    }

    /// Whether the pidfile currently exists.
    pub fn is_locked(&self) -> bool {
        self.lock_path.exists()
    }

    /// Pid recorded in the pidfile, if readable.
    pub fn holder_pid(&self) -> Option<u32> {
        fs::read_to_string(&self.lock_path)
            .ok()?
            .trim()
            .parse()
            .ok()
    }
}
