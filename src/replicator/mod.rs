//! Replicator subsystem: drives the external rsync process.
//!
//! Given source directories, a staging destination, an optional
//! link-dest target and exclude patterns, rsync synchronises the source
//! contents into the staging directory, hard-linking files unchanged
//! since the link-dest target. Exit codes propagate unchanged to the
//! retry driver's classifier; a run that exceeds the configured
//! wall-clock timeout is terminated and reported as code 30.

mod progress;
mod stats;

pub use progress::{ProgressCallback, ProgressInfo, ProgressReporter};
pub use stats::{parse_stats, ReplicationStats};

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::signals::SignalHandler;

/// Exit code reported for a timed-out replication run.
pub const TIMEOUT_EXIT_CODE: i32 = 30;

/// Outcome of one replication attempt, shaped for the retry driver.
#[derive(Debug, Clone)]
pub struct ReplicationOutcome {
    pub return_code: i32,
    pub error_message: String,
    pub stdout: String,
}

/// Invokes rsync into a staging directory.
pub struct Replicator {
    program: PathBuf,
    exclude_patterns: Vec<String>,
    timeout_seconds: u64,
}

impl Replicator {
    pub fn new(
        program: impl Into<PathBuf>,
        exclude_patterns: Vec<String>,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            program: program.into(),
            exclude_patterns,
            timeout_seconds,
        }
    }

    /// Build the rsync argument list.
    ///
    /// `-a` preserves permissions, mtimes and symlinks (without following
    /// them); `--delete` drops files gone from the sources; sources get a
    /// trailing slash so their contents, not the directories themselves,
    /// are copied. `--progress` is used rather than `--info=progress2`
    /// for compatibility with older rsync builds (including openrsync).
    pub fn build_args(
        sources: &[PathBuf],
        dest: &Path,
        link_dest: Option<&Path>,
        exclude_file: &Path,
        with_progress: bool,
    ) -> Vec<String> {
        let mut args = vec![
            "-av".to_string(),
            "--delete".to_string(),
            "--stats".to_string(),
        ];

        if with_progress {
            args.push("--progress".to_string());
        }

        if let Some(link_dest) = link_dest {
            args.push(format!("--link-dest={}", link_dest.display()));
        }

        args.push(format!("--exclude-from={}", exclude_file.display()));

        for source in sources {
            let mut source_str = source.display().to_string();
            if !source_str.ends_with('/') {
                source_str.push('/');
            }
            args.push(source_str);
        }

        args.push(format!("{}/", dest.display()));
        args
    }

    fn write_exclude_file(&self) -> std::io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("devbackup_exclude_")
            .suffix(".txt")
            .tempfile()?;
        for pattern in &self.exclude_patterns {
            writeln!(file, "{}", pattern)?;
        }
        file.flush()?;
        Ok(file)
    }

    /// Run one replication attempt.
    ///
    /// The child is registered with the signal handler for the duration
    /// of the run. Stdout is consumed line-by-line on a helper thread
    /// (feeding the progress reporter when present) which is joined
    /// before this returns. Launch failures surface as code `-1`, which
    /// the retry classifier treats as non-retryable.
    pub fn run(
        &self,
        sources: &[PathBuf],
        staging: &Path,
        link_dest: Option<&Path>,
        signal_handler: Option<&SignalHandler>,
        reporter: Option<Arc<Mutex<ProgressReporter>>>,
    ) -> ReplicationOutcome {
        let exclude_file = match self.write_exclude_file() {
            Ok(file) => file,
            Err(e) => {
                return ReplicationOutcome {
                    return_code: -1,
                    error_message: format!("failed to write exclude file: {}", e),
                    stdout: String::new(),
                }
            }
        };

        let args = Self::build_args(
            sources,
            staging,
            link_dest,
            exclude_file.path(),
            reporter.is_some(),
        );

        let mut child = match Command::new(&self.program)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return ReplicationOutcome {
                    return_code: -1,
                    error_message: format!(
                        "failed to launch {}: {}",
                        self.program.display(),
                        e
                    ),
                    stdout: String::new(),
                }
            }
        };

        if let Some(handler) = signal_handler {
            handler.set_replicator_pid(Some(child.id()));
        }

        let collected: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let stdout_thread = child.stdout.take().map(|pipe| {
            let collected = Arc::clone(&collected);
            let reporter = reporter.clone();
            thread::spawn(move || {
                let reader = BufReader::new(pipe);
                for line in reader.lines() {
                    let Ok(line) = line else { break };
                    if let Some(reporter) = reporter.as_ref() {
                        if let Ok(mut reporter) = reporter.lock() {
                            reporter.parse_line(&line);
                        }
                    }
                    if let Ok(mut collected) = collected.lock() {
                        collected.push_str(&line);
                        collected.push('\n');
                    }
                }
                let _ = done_tx.send(());
            })
        });

        let stderr_thread = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buffer = String::new();
                let _ = pipe.read_to_string(&mut buffer);
                buffer
            })
        });

        let timed_out = if stdout_thread.is_some() {
            done_rx
                .recv_timeout(Duration::from_secs(self.timeout_seconds))
                .is_err()
        } else {
            false
        };

        if timed_out {
            terminate_child(&mut child);
            if let Some(thread) = stdout_thread {
                let _ = thread.join();
            }
            if let Some(thread) = stderr_thread {
                let _ = thread.join();
            }
            if let Some(handler) = signal_handler {
                handler.set_replicator_pid(None);
            }
            let stdout = collected.lock().map(|s| s.clone()).unwrap_or_default();
            return ReplicationOutcome {
                return_code: TIMEOUT_EXIT_CODE,
                error_message: format!("rsync timed out after {} seconds", self.timeout_seconds),
                stdout,
            };
        }

        let status = child.wait();
        if let Some(thread) = stdout_thread {
            let _ = thread.join();
        }
        let stderr = stderr_thread
            .and_then(|thread| thread.join().ok())
            .unwrap_or_default();

        if let Some(handler) = signal_handler {
            handler.set_replicator_pid(None);
        }

        let return_code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
        let stdout = collected.lock().map(|s| s.clone()).unwrap_or_default();
        let error_message = if stderr.trim().is_empty() {
            format!("rsync exited with code {}", return_code)
        } else {
            stderr.trim().to_string()
        };

        ReplicationOutcome {
            return_code,
            error_message,
            stdout,
        }
    }
}

/// Terminate a replicator child: polite signal first, forceful after a
/// short grace period. Safe to call on an already-exited child.
pub fn terminate_child(child: &mut Child) {
    #[cfg(unix)]
    {
        unsafe {
            libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
        }
        for _ in 0..50 {
            if matches!(child.try_wait(), Ok(Some(_))) {
                return;
            }
            thread::sleep(Duration::from_millis(100));
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn write_fake_rsync(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-rsync");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_build_args_shape() {
        let sources = vec![PathBuf::from("/home/dev/projects")];
        let args = Replicator::build_args(
            &sources,
            Path::new("/backups/in_progress_2025-01-07-103000"),
            Some(Path::new("/backups/2025-01-07-093000")),
            Path::new("/tmp/excludes.txt"),
            false,
        );
        assert_eq!(args[0], "-av");
        assert!(args.contains(&"--delete".to_string()));
        assert!(args.contains(&"--stats".to_string()));
        assert!(args.contains(&"--link-dest=/backups/2025-01-07-093000".to_string()));
        assert!(args.contains(&"--exclude-from=/tmp/excludes.txt".to_string()));
        // Sources get trailing-slash contents semantics
        assert!(args.contains(&"/home/dev/projects/".to_string()));
        assert_eq!(
            args.last().unwrap(),
            "/backups/in_progress_2025-01-07-103000/"
        );
        assert!(!args.contains(&"--progress".to_string()));
    }

    #[test]
    fn test_build_args_with_progress_and_no_link_dest() {
        let sources = vec![PathBuf::from("/src/")];
        let args = Replicator::build_args(
            &sources,
            Path::new("/dst"),
            None,
            Path::new("/tmp/x.txt"),
            true,
        );
        assert!(args.contains(&"--progress".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--link-dest")));
        // Already-slashed source is not doubled
        assert!(args.contains(&"/src/".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_success_collects_stdout() {
        let tmp = TempDir::new().unwrap();
        let program = write_fake_rsync(
            tmp.path(),
            "echo 'sending incremental file list'\necho 'a.txt'\necho 'sent 170 bytes  received 53 bytes'\nexit 0",
        );
        let replicator = Replicator::new(&program, vec![], 30);
        let outcome = replicator.run(
            &[tmp.path().to_path_buf()],
            &tmp.path().join("dst"),
            None,
            None,
            None,
        );
        assert_eq!(outcome.return_code, 0);
        assert!(outcome.stdout.contains("a.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_failure_reports_stderr() {
        let tmp = TempDir::new().unwrap();
        let program = write_fake_rsync(tmp.path(), "echo 'disk gone' >&2\nexit 23");
        let replicator = Replicator::new(&program, vec![], 30);
        let outcome = replicator.run(
            &[tmp.path().to_path_buf()],
            &tmp.path().join("dst"),
            None,
            None,
            None,
        );
        assert_eq!(outcome.return_code, 23);
        assert_eq!(outcome.error_message, "disk gone");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_timeout_reports_code_30() {
        let tmp = TempDir::new().unwrap();
        let program = write_fake_rsync(tmp.path(), "sleep 30");
        let replicator = Replicator::new(&program, vec![], 1);
        let outcome = replicator.run(
            &[tmp.path().to_path_buf()],
            &tmp.path().join("dst"),
            None,
            None,
            None,
        );
        assert_eq!(outcome.return_code, TIMEOUT_EXIT_CODE);
        assert!(outcome.error_message.contains("timed out"));
    }

    #[test]
    fn test_run_missing_program_is_not_retryable() {
        let replicator = Replicator::new("/nonexistent/devbackup-rsync", vec![], 30);
        let outcome = replicator.run(
            &[PathBuf::from("/tmp")],
            Path::new("/tmp/devbackup-test-dst"),
            None,
            None,
            None,
        );
        assert_eq!(outcome.return_code, -1);
        assert!(!crate::retry::is_retryable_error(outcome.return_code));
    }

    #[cfg(unix)]
    #[test]
    fn test_progress_reporter_fed_from_stdout() {
        let tmp = TempDir::new().unwrap();
        let program = write_fake_rsync(
            tmp.path(),
            "echo '             13 100%  436.46KB/s   00:00:00 (xfer#1, to-check=0/1)'\nexit 0",
        );
        let replicator = Replicator::new(&program, vec![], 30);
        let reporter = Arc::new(Mutex::new(ProgressReporter::new(None)));
        let outcome = replicator.run(
            &[tmp.path().to_path_buf()],
            &tmp.path().join("dst"),
            None,
            None,
            Some(Arc::clone(&reporter)),
        );
        assert_eq!(outcome.return_code, 0);
        let progress = reporter.lock().unwrap().current();
        assert_eq!(progress.bytes_transferred, 13);
        assert_eq!(progress.percent_complete, Some(100.0));
    }
}
