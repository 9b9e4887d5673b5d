//! Snapshot directory naming.
//!
//! Two name forms exist, and both sort lexicographically into
//! chronological order:
//!
//! - `YYYY-MM-DD-HHMMSS` (base form)
//! - `YYYY-MM-DD-HHMMSS-NN` with `NN` in `01`..`99` (collision form)
//!
//! This parser is the single source of truth for what counts as a
//! snapshot name; the engine, retention and verification all go through
//! it.

use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};

use crate::observability::Logger;

/// strftime format for snapshot directory names
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";

/// Prefix for staging (in-progress) snapshot directories
pub const IN_PROGRESS_PREFIX: &str = "in_progress_";

/// Render the current local time as a base snapshot name.
pub fn generate_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a snapshot name into its timestamp.
///
/// Accepts both the base form and the collision form; returns `None` for
/// anything else.
pub fn parse_snapshot_name(name: &str) -> Option<NaiveDateTime> {
    if let Ok(ts) = NaiveDateTime::parse_from_str(name, TIMESTAMP_FORMAT) {
        return Some(ts);
    }

    // Collision form: base name plus "-NN" where NN is 01..99
    if name.len() == 20 && name.as_bytes()[17] == b'-' {
        let seq: u32 = name[18..].parse().ok()?;
        if (1..=99).contains(&seq) {
            return NaiveDateTime::parse_from_str(&name[..17], TIMESTAMP_FORMAT).ok();
        }
    }

    None
}

/// Check whether either form of a name (committed or staging) exists
/// under the backup root.
pub fn name_in_use(destination: &Path, name: &str) -> bool {
    destination.join(name).exists()
        || destination
            .join(format!("{}{}", IN_PROGRESS_PREFIX, name))
            .exists()
}

/// Allocate a unique snapshot name under the backup root.
///
/// The base timestamp is used when free. On collision the sequence
/// suffixes `-01`..`-99` are tried in ascending order, checking both the
/// committed and staging forms. If all 99 are taken, the allocator
/// sleeps one second and re-runs the whole procedure, up to three
/// rounds; after that the then-current base timestamp is returned and
/// the caller's creation step surfaces any remaining conflict.
///
/// This runs before the staging directory is created so the chosen name
/// is still unique at creation time.
pub fn generate_unique_snapshot_name(destination: &Path) -> String {
    const MAX_ROUNDS: u32 = 3;

    for _ in 0..MAX_ROUNDS {
        let timestamp = generate_timestamp();

        if !name_in_use(destination, &timestamp) {
            return timestamp;
        }

        for seq in 1..=99u32 {
            let seq_name = format!("{}-{:02}", timestamp, seq);
            if !name_in_use(destination, &seq_name) {
                Logger::debug("SNAPSHOT_NAME_COLLISION", &[("name", &seq_name)]);
                return seq_name;
            }
        }

        Logger::warn("SNAPSHOT_SEQUENCE_EXHAUSTED", &[("timestamp", &timestamp)]);
        thread::sleep(Duration::from_secs(1));
    }

    generate_timestamp()
}
