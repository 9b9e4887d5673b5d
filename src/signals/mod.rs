//! Signal-driven cleanup for interrupted runs.
//!
//! A [`SignalHandler`] holds the pieces of run state that must be torn
//! down when the process receives SIGINT/SIGTERM: the active staging
//! directory (if any), the replicator child (if any) and the pidfile.
//! On signal, the handler terminates the child, removes the staging
//! directory, releases the lock and exits with a distinct status.
//!
//! The OS hook can only be installed once per process, so the hook is
//! installed lazily on first registration and routed through an armed
//! flag; `unregister()` disarms it and clears all slots. The snapshot
//! engine updates the staging/child slots as it enters and leaves those
//! regions.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once, OnceLock};
use std::thread;
use std::time::Duration;

use crate::observability::Logger;

/// Exit status used when a run is interrupted by a signal.
pub const SIGNAL_EXIT_CODE: i32 = 130;

#[derive(Default)]
struct CleanupState {
    armed: AtomicBool,
    staging_path: Mutex<Option<PathBuf>>,
    replicator_pid: Mutex<Option<u32>>,
    lock_path: Mutex<Option<PathBuf>>,
}

impl CleanupState {
    /// Run the teardown sequence: child, staging directory, lock.
    fn cleanup(&self) {
        if let Some(pid) = self.replicator_pid.lock().ok().and_then(|mut p| p.take()) {
            terminate_pid(pid);
        }

        if let Some(staging) = self.staging_path.lock().ok().and_then(|mut p| p.take()) {
            Logger::warn(
                "SIGNAL_STAGING_REMOVED",
                &[("path", &staging.display().to_string())],
            );
            let _ = fs::remove_dir_all(&staging);
        }

        if let Some(lock) = self.lock_path.lock().ok().and_then(|mut p| p.take()) {
            let _ = fs::remove_file(&lock);
        }
    }
}

fn terminate_pid(pid: u32) {
    #[cfg(unix)]
    {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        // Short grace, then force.
        thread::sleep(Duration::from_millis(500));
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

fn global_state() -> &'static Arc<CleanupState> {
    static STATE: OnceLock<Arc<CleanupState>> = OnceLock::new();
    STATE.get_or_init(|| Arc::new(CleanupState::default()))
}

fn install_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let state = Arc::clone(global_state());
        // Covers SIGINT and (with the termination feature) SIGTERM.
        let result = ctrlc::set_handler(move || {
            if !state.armed.load(Ordering::SeqCst) {
                return;
            }
            Logger::warn("SIGNAL_RECEIVED", &[]);
            state.cleanup();
            process::exit(SIGNAL_EXIT_CODE);
        });
        if let Err(e) = result {
            Logger::warn("SIGNAL_HOOK_FAILED", &[("error", &e.to_string())]);
        }
    });
}

/// Handle on the process-wide cleanup state for one run.
pub struct SignalHandler {
    state: Arc<CleanupState>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self {
            state: Arc::clone(global_state()),
        }
    }

    /// Arm signal-driven cleanup for a run holding the given pidfile.
    pub fn register(&self, lock_path: PathBuf) {
        install_hook();
        if let Ok(mut slot) = self.state.lock_path.lock() {
            *slot = Some(lock_path);
        }
        self.state.armed.store(true, Ordering::SeqCst);
    }

    /// Disarm cleanup and clear all slots. Always called in the
    /// orchestrator's finally, on every exit path.
    pub fn unregister(&self) {
        self.state.armed.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.state.staging_path.lock() {
            *slot = None;
        }
        if let Ok(mut slot) = self.state.replicator_pid.lock() {
            *slot = None;
        }
        if let Ok(mut slot) = self.state.lock_path.lock() {
            *slot = None;
        }
    }

    /// Record (or clear) the staging directory of the active run.
    pub fn set_staging_path(&self, path: Option<PathBuf>) {
        if let Ok(mut slot) = self.state.staging_path.lock() {
            *slot = path;
        }
    }

    /// Record (or clear) the replicator child of the active run.
    pub fn set_replicator_pid(&self, pid: Option<u32>) {
        if let Ok(mut slot) = self.state.replicator_pid.lock() {
            *slot = pid;
        }
    }

    /// Current staging path, if a run is inside the staging region.
    pub fn staging_path(&self) -> Option<PathBuf> {
        self.state.staging_path.lock().ok().and_then(|p| p.clone())
    }

    /// Current replicator pid, if a child is running.
    pub fn replicator_pid(&self) -> Option<u32> {
        self.state.replicator_pid.lock().ok().and_then(|p| *p)
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
