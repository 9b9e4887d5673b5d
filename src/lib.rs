//! devbackup - incremental, hard-linked, verified snapshots
//!
//! The snapshot engine replicates a set of source trees into timestamped
//! snapshot directories, hard-linking unchanged files against the previous
//! snapshot, and retains them under an hourly/daily/weekly policy.

pub mod backup;
pub mod cli;
pub mod config;
pub mod destination;
pub mod lock;
pub mod observability;
pub mod queue;
pub mod replicator;
pub mod retention;
pub mod retry;
pub mod signals;
pub mod snapshot;
pub mod verify;
