//! CLI argument definitions using clap
//!
//! Commands:
//! - devbackup backup [--no-queue] [--no-space-check]
//! - devbackup drain-queue
//! - devbackup list
//! - devbackup restore <snapshot> <path> [--to <dest>]
//! - devbackup diff <snapshot> [path]
//! - devbackup search <pattern> [--snapshot <name>]
//! - devbackup verify <snapshot> [--filter <glob>]
//! - devbackup queue-status / queue-clear
//! - devbackup init-config --destination <path> --source <path>...

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// devbackup - incremental, hard-linked, verified snapshots
#[derive(Parser, Debug)]
#[command(name = "devbackup")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one snapshot now
    Backup {
        /// Do not queue the run when the destination is unavailable
        #[arg(long)]
        no_queue: bool,

        /// Skip the free-space pre-flight check
        #[arg(long)]
        no_space_check: bool,
    },

    /// Run backups deferred while the destination was unavailable
    DrainQueue {
        /// Maximum queued items to process
        #[arg(long, default_value_t = 10)]
        max_items: usize,
    },

    /// List committed snapshots
    List,

    /// Restore a file or directory from a snapshot
    Restore {
        /// Snapshot name (YYYY-MM-DD-HHMMSS[-NN])
        snapshot: String,

        /// Path inside the snapshot to restore
        path: String,

        /// Destination (defaults to the original location)
        #[arg(long)]
        to: Option<PathBuf>,
    },

    /// Compare a snapshot against the current source state
    Diff {
        /// Snapshot name
        snapshot: String,

        /// Restrict the comparison to one path
        path: Option<String>,
    },

    /// Search snapshots for files matching a glob pattern
    Search {
        /// Glob pattern matched against file names
        pattern: String,

        /// Search a single snapshot instead of all
        #[arg(long)]
        snapshot: Option<String>,
    },

    /// Verify a snapshot against its integrity manifest
    Verify {
        /// Snapshot name
        snapshot: String,

        /// Only verify entries matching this glob
        #[arg(long)]
        filter: Option<String>,
    },

    /// Show the persistent backup queue
    QueueStatus,

    /// Remove every queued backup request
    QueueClear,

    /// Write a starter configuration file
    InitConfig {
        /// Backup destination directory
        #[arg(long)]
        destination: PathBuf,

        /// Source directory (repeatable)
        #[arg(long = "source", required = true)]
        sources: Vec<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
