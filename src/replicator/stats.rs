//! Replication statistics parsing.
//!
//! Extracts the totals rsync prints with `--stats`:
//!
//! ```text
//! Number of files: 2,895 (reg: 2,500, dir: 395)
//! Number of created files: 5
//! Number of regular files transferred: 3
//! sent 1,234 bytes  received 35 bytes  2,538.00 bytes/sec
//! ```
//!
//! Older rsync builds without the stats block fall back to counting the
//! file-name lines of verbose output.

/// Totals parsed from a successful replication run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    /// Files that were actually copied (changed)
    pub files_transferred: u64,
    /// Total files in the snapshot (including hard-linked unchanged ones)
    pub total_files: u64,
    /// Bytes sent
    pub total_size: u64,
}

fn parse_count(value: &str) -> Option<u64> {
    value
        .split('(')
        .next()?
        .trim()
        .replace(',', "")
        .parse()
        .ok()
}

/// Parse rsync verbose/stats output into totals.
pub fn parse_stats(output: &str) -> ReplicationStats {
    let mut stats = ReplicationStats::default();

    for line in output.lines() {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("Number of files:") {
            if let Some(count) = parse_count(rest) {
                stats.total_files = count;
            }
        } else if line.to_lowercase().contains("files transferred:") {
            if let Some(value) = line.split(':').nth(1) {
                if let Some(count) = parse_count(value) {
                    stats.files_transferred = count;
                }
            }
        } else if line.to_lowercase().contains("created files:") {
            if let Some(value) = line.split(':').nth(1) {
                if let Some(count) = parse_count(value) {
                    stats.files_transferred += count;
                }
            }
        } else if let Some(rest) = line.strip_prefix("sent ") {
            if let Some(first) = rest.split_whitespace().next() {
                if let Ok(bytes) = first.replace(',', "").parse() {
                    stats.total_size = bytes;
                }
            }
        }
    }

    // Fallback for rsync builds without a stats block: count file lines.
    if stats.total_files == 0 {
        let mut counted = 0u64;
        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let is_chatter = [
                "sending", "sent", "total", "building", "Number", "receiving", "created",
                "deleting",
            ]
            .iter()
            .any(|p| line.starts_with(p));
            if !is_chatter {
                counted += 1;
            }
        }
        stats.total_files = counted;
        stats.files_transferred = counted;
    }

    stats
}
