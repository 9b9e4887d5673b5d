//! Structured JSON logger.
//!
//! A backup run emits one JSON object per event: `event` first, then
//! `severity`, then the remaining fields sorted by key, so lines from
//! different runs diff cleanly. The configured minimum severity is
//! consulted before a line is rendered; writes are synchronous and
//! unbuffered. ERROR goes to stderr, everything else to stdout.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};

/// Log severity levels, lowest first.
///
/// These mirror the `logging.level` values accepted by the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    /// Parse a config-file level name (case-insensitive).
    ///
    /// Unknown names fall back to Info so a typo in the config raises
    /// the noise floor instead of silencing the run.
    pub fn from_name(name: &str) -> Severity {
        match name.to_ascii_uppercase().as_str() {
            "DEBUG" => Severity::Debug,
            "WARN" | "WARNING" => Severity::Warn,
            "ERROR" => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Minimum severity that is actually emitted, set once per run from the
// configuration. Defaults to Info.
static MIN_SEVERITY: AtomicU8 = AtomicU8::new(Severity::Info as u8);

/// Set the process-wide minimum severity.
pub fn set_min_severity(severity: Severity) {
    MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
}

fn min_severity() -> Severity {
    match MIN_SEVERITY.load(Ordering::Relaxed) {
        0 => Severity::Debug,
        2 => Severity::Warn,
        3 => Severity::Error,
        _ => Severity::Info,
    }
}

// serde_json does the escaping; key ordering is ours.
fn quoted(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

/// Emits structured JSON log lines.
pub struct Logger;

impl Logger {
    /// Log an event at the given severity.
    ///
    /// Fields are rendered in deterministic order (sorted by key, after
    /// the fixed `event` and `severity` keys).
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        let Some(line) = Self::format_if_enabled(severity, event, fields) else {
            return;
        };

        if severity == Severity::Error {
            let stderr = io::stderr();
            let mut out = stderr.lock();
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        } else {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }

    // The severity gate: consults the configured minimum before any
    // rendering work happens.
    fn format_if_enabled(
        severity: Severity,
        event: &str,
        fields: &[(&str, &str)],
    ) -> Option<String> {
        if severity < min_severity() {
            return None;
        }
        Some(Self::render(severity, event, fields))
    }

    fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut line = String::with_capacity(128);
        line.push('{');
        line.push_str("\"event\":");
        line.push_str(&quoted(event));
        line.push_str(",\"severity\":\"");
        line.push_str(severity.as_str());
        line.push('"');

        let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
        sorted.sort_by_key(|(key, _)| *key);
        for (key, value) in sorted {
            line.push(',');
            line.push_str(&quoted(key));
            line.push(':');
            line.push_str(&quoted(value));
        }

        line.push('}');
        line
    }

    /// Log at DEBUG level
    pub fn debug(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Debug, event, fields);
    }

    /// Log at INFO level
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }
}
