//! Configuration for devbackup.
//!
//! A JSON config file (default `~/.config/devbackup/config.json`) with
//! serde-supplied defaults for everything except the destination and
//! source list. The configuration is immutable for the duration of a
//! run.

mod errors;

pub use errors::{ConfigError, ConfigResult};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::queue::default_queue_path;
use crate::retry::RetryConfig;

/// Default exclude patterns for development projects.
pub const DEFAULT_EXCLUDES: [&str; 17] = [
    "node_modules/",
    ".git/",
    "__pycache__/",
    "*.pyc",
    ".pytest_cache/",
    "build/",
    "dist/",
    ".next/",
    "target/",
    "*.log",
    ".DS_Store",
    "*.tmp",
    ".env.local",
    "coverage/",
    ".nyc_output/",
    "vendor/",
    ".venv/",
];

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("devbackup")
        .join("config.json")
}

fn default_lock_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("devbackup")
        .join("devbackup.pid")
}

fn default_exclude_patterns() -> Vec<String> {
    DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect()
}

fn default_rsync_program() -> PathBuf {
    PathBuf::from("rsync")
}

/// Snapshot retention policy counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetentionPolicy {
    #[serde(default = "default_hourly")]
    pub hourly: u32,
    #[serde(default = "default_daily")]
    pub daily: u32,
    #[serde(default = "default_weekly")]
    pub weekly: u32,
}

fn default_hourly() -> u32 {
    24
}
fn default_daily() -> u32 {
    7
}
fn default_weekly() -> u32 {
    4
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            hourly: default_hourly(),
            daily: default_daily(),
            weekly: default_weekly(),
        }
    }
}

/// Retry behavior for transient replication failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_seconds: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_seconds: f64,
    #[serde(default = "default_rsync_timeout")]
    pub rsync_timeout_seconds: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay() -> f64 {
    5.0
}
fn default_max_delay() -> f64 {
    300.0
}
fn default_rsync_timeout() -> u64 {
    3600
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_seconds: default_base_delay(),
            max_delay_seconds: default_max_delay(),
            rsync_timeout_seconds: default_rsync_timeout(),
        }
    }
}

impl RetrySettings {
    /// View as the retry driver's config.
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay_seconds: self.base_delay_seconds,
            max_delay_seconds: self.max_delay_seconds,
            rsync_timeout_seconds: self.rsync_timeout_seconds,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub backup_destination: PathBuf,
    pub source_directories: Vec<PathBuf>,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    #[serde(default)]
    pub retention: RetentionPolicy,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default = "default_queue_path")]
    pub queue_path: PathBuf,

    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,

    #[serde(default = "default_rsync_program")]
    pub rsync_program: PathBuf,
}

impl Config {
    /// Build a configuration with defaults for everything but the
    /// required fields.
    pub fn new(backup_destination: PathBuf, source_directories: Vec<PathBuf>) -> Self {
        Self {
            backup_destination,
            source_directories,
            exclude_patterns: default_exclude_patterns(),
            retention: RetentionPolicy::default(),
            retry: RetrySettings::default(),
            logging: LoggingSettings::default(),
            queue_path: default_queue_path(),
            lock_path: default_lock_path(),
            rsync_program: default_rsync_program(),
        }
    }

    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;

        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.backup_destination.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "backup_destination must not be empty".to_string(),
            ));
        }

        if self.source_directories.is_empty() {
            return Err(ConfigError::Validation(
                "source_directories must list at least one directory".to_string(),
            ));
        }

        if self.retry.base_delay_seconds <= 0.0 || self.retry.max_delay_seconds <= 0.0 {
            return Err(ConfigError::Validation(
                "retry delays must be > 0".to_string(),
            ));
        }

        if self.retry.rsync_timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "rsync_timeout_seconds must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Serialize to pretty-printed JSON (for `init-config`).
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
