//! Replication progress parsing.
//!
//! Parses rsync `--progress` output lines into [`ProgressInfo`] updates.
//! Two line shapes are handled: per-file progress lines
//! (`"      1,234,567  12%  123.45kB/s  0:01:23 (xfer#3, to-check=7/10)"`)
//! and the equivalent `--info=progress2` form with `xfr#`/`to-chk=`.
//! When no progress lines appear, filename lines heard in verbose output
//! advance a best-effort file counter.

use regex::Regex;

/// Current replication progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressInfo {
    pub files_transferred: u64,
    pub total_files: Option<u64>,
    pub bytes_transferred: u64,
    pub total_bytes: Option<u64>,
    /// Bytes per second
    pub transfer_rate: f64,
    pub current_file: Option<String>,
    pub percent_complete: Option<f64>,
}

/// Callback invoked on each progress update.
pub type ProgressCallback = Box<dyn FnMut(&ProgressInfo) + Send>;

// Output lines that are rsync chatter rather than file names.
const NON_FILE_PREFIXES: [&str; 15] = [
    "sending", "sent", "total", "building", "receiving", "created", "deleting", "rsync",
    "Number", "Total", "Literal", "Matched", "File", "cannot", "skipping",
];

/// Parses rsync output lines and reports progress.
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    current: ProgressInfo,
    files_seen: u64,
    pattern: Regex,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        // Bytes, percent, rate with unit, elapsed time, optional transfer
        // counters in either the --progress or --info=progress2 spelling.
        let pattern = Regex::new(
            r"^\s*(?P<bytes>[\d,]+)\s+(?P<percent>\d+)%\s+(?P<rate>[\d.]+)(?P<unit>[kKMG]?B)/s\s+\d+:\d+:\d+(?:\s+\((?:xfr|xfer)#(?P<xfr>\d+),\s*to-ch(?:k|eck)=(?P<to_chk>\d+)/(?P<total>\d+)\))?",
        )
        .expect("progress pattern is valid");

        Self {
            callback,
            current: ProgressInfo::default(),
            files_seen: 0,
            pattern,
        }
    }

    fn rate_multiplier(unit: &str) -> f64 {
        match unit {
            "kB" | "KB" => 1024.0,
            "MB" => 1024.0 * 1024.0,
            "GB" => 1024.0 * 1024.0 * 1024.0,
            _ => 1.0,
        }
    }

    /// Parse a line of rsync output and update progress.
    ///
    /// Returns the updated progress when the line carried information.
    pub fn parse_line(&mut self, line: &str) -> Option<ProgressInfo> {
        let line = line.trim_end();
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(captures) = self.pattern.captures(line) {
            let bytes_transferred: u64 = captures["bytes"].replace(',', "").parse().ok()?;
            let percent: f64 = captures["percent"].parse().ok()?;
            let rate_value: f64 = captures["rate"].parse().ok()?;
            let transfer_rate = rate_value * Self::rate_multiplier(&captures["unit"]);

            let mut files_transferred = None;
            let mut total_files = None;
            if let Some(xfr) = captures.name("xfr") {
                files_transferred = xfr.as_str().parse::<u64>().ok();
            }
            if let Some(total) = captures.name("total") {
                total_files = total.as_str().parse::<u64>().ok();
                if let (Some(total), Some(to_chk)) = (
                    total_files,
                    captures
                        .name("to_chk")
                        .and_then(|m| m.as_str().parse::<u64>().ok()),
                ) {
                    files_transferred = Some(total.saturating_sub(to_chk));
                }
            }

            let total_bytes = if percent > 0.0 && bytes_transferred > 0 {
                Some((bytes_transferred as f64 * 100.0 / percent) as u64)
            } else {
                None
            };

            self.current = ProgressInfo {
                files_transferred: files_transferred.unwrap_or(self.files_seen),
                total_files,
                bytes_transferred,
                total_bytes,
                transfer_rate,
                current_file: self.current.current_file.clone(),
                percent_complete: Some(percent),
            };

            self.emit();
            return Some(self.current.clone());
        }

        // Anything not starting with known rsync chatter is most likely a
        // file name from verbose output.
        if !NON_FILE_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            self.files_seen += 1;
            self.current.current_file = Some(trimmed.to_string());
            self.current.files_transferred = self.files_seen;
            self.emit();
            return Some(self.current.clone());
        }

        None
    }

    /// Report final statistics after a successful run.
    pub fn report_final(
        &mut self,
        files_transferred: u64,
        total_size: u64,
        duration_seconds: f64,
    ) -> ProgressInfo {
        let transfer_rate = if duration_seconds > 0.0 {
            total_size as f64 / duration_seconds
        } else {
            0.0
        };

        self.current = ProgressInfo {
            files_transferred,
            total_files: Some(files_transferred),
            bytes_transferred: total_size,
            total_bytes: Some(total_size),
            transfer_rate,
            current_file: None,
            percent_complete: Some(100.0),
        };
        self.emit();
        self.current.clone()
    }

    /// Current progress snapshot.
    pub fn current(&self) -> ProgressInfo {
        self.current.clone()
    }

    fn emit(&mut self) {
        if let Some(callback) = self.callback.as_mut() {
            callback(&self.current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_per_file_progress_line() {
        let mut reporter = ProgressReporter::new(None);
        let info = reporter
            .parse_line("             13 100%  436.46KB/s   00:00:00 (xfer#1, to-check=0/1)")
            .unwrap();
        assert_eq!(info.bytes_transferred, 13);
        assert_eq!(info.percent_complete, Some(100.0));
        assert_eq!(info.files_transferred, 1);
        assert_eq!(info.total_files, Some(1));
        assert!((info.transfer_rate - 436.46 * 1024.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_progress2_line() {
        let mut reporter = ProgressReporter::new(None);
        let info = reporter
            .parse_line("  1,234,567  12%  123.45MB/s  0:01:23 (xfr#3, to-chk=88/100)")
            .unwrap();
        assert_eq!(info.bytes_transferred, 1_234_567);
        assert_eq!(info.percent_complete, Some(12.0));
        assert_eq!(info.files_transferred, 12);
        assert_eq!(info.total_files, Some(100));
        assert_eq!(info.total_bytes, Some(1_234_567 * 100 / 12));
    }

    #[test]
    fn test_rate_units_normalized() {
        let mut reporter = ProgressReporter::new(None);
        let info = reporter
            .parse_line("  1,000  50%  2.00GB/s  0:00:01")
            .unwrap();
        assert_eq!(info.transfer_rate, 2.0 * 1024.0 * 1024.0 * 1024.0);
    }

    #[test]
    fn test_filename_lines_advance_counter() {
        let mut reporter = ProgressReporter::new(None);
        reporter.parse_line("src/main.rs").unwrap();
        let info = reporter.parse_line("src/lib.rs").unwrap();
        assert_eq!(info.files_transferred, 2);
        assert_eq!(info.current_file.as_deref(), Some("src/lib.rs"));
    }

    #[test]
    fn test_chatter_lines_ignored() {
        let mut reporter = ProgressReporter::new(None);
        assert!(reporter.parse_line("sending incremental file list").is_none());
        assert!(reporter
            .parse_line("sent 1,234 bytes  received 35 bytes")
            .is_none());
        assert!(reporter.parse_line("").is_none());
        assert_eq!(reporter.current().files_transferred, 0);
    }

    #[test]
    fn test_callback_invoked() {
        use std::sync::{Arc, Mutex};
        let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let mut reporter = ProgressReporter::new(Some(Box::new(move |info| {
            seen_clone.lock().unwrap().push(info.bytes_transferred);
        })));
        reporter.parse_line("  100  10%  1.00kB/s  0:00:01");
        reporter.report_final(5, 1000, 2.0);
        assert_eq!(seen.lock().unwrap().as_slice(), &[100, 1000]);
    }

    #[test]
    fn test_report_final() {
        let mut reporter = ProgressReporter::new(None);
        let info = reporter.report_final(10, 4096, 2.0);
        assert_eq!(info.files_transferred, 10);
        assert_eq!(info.total_bytes, Some(4096));
        assert_eq!(info.transfer_rate, 2048.0);
        assert_eq!(info.percent_complete, Some(100.0));
    }
}
