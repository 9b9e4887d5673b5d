//! Snapshot-to-source comparison.
//!
//! Builds relative-path sets for the snapshot and for the current state
//! of the source directories (symlink-safe on both sides) and classifies
//! every path as added, deleted or modified. Modification is detected by
//! size first, then mtime, escalating to a byte-wise comparison only
//! when sizes match but mtimes differ.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::verify::MANIFEST_FILENAME;

use super::walk;

/// Classified differences between a snapshot and the live sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// Present in the sources, absent from the snapshot
    pub added: Vec<String>,
    /// Present in both but different
    pub modified: Vec<String>,
    /// Present in the snapshot, absent from the sources
    pub deleted: Vec<String>,
}

fn collect(root: &Path, sub_path: Option<&str>) -> BTreeMap<String, PathBuf> {
    match sub_path {
        None => walk::relative_file_map(root),
        Some(sub) => {
            let base = root.join(sub);
            if base.is_file() {
                let mut single = BTreeMap::new();
                single.insert(sub.to_string(), base);
                single
            } else if base.is_dir() {
                walk::relative_file_map(&base)
                    .into_values()
                    .filter_map(|abs| {
                        let rel = abs.strip_prefix(root).ok()?;
                        Some((rel.to_string_lossy().into_owned(), abs))
                    })
                    .collect()
            } else {
                BTreeMap::new()
            }
        }
    }
}

/// Compare a snapshot against the current state of the sources.
pub fn diff(
    snapshot: &Path,
    source_directories: &[PathBuf],
    source_path: Option<&str>,
) -> DiffResult {
    let mut result = DiffResult::default();

    if !snapshot.is_dir() {
        return result;
    }

    let mut snapshot_files = collect(snapshot, source_path);
    // The manifest lives only in snapshots, never in sources.
    snapshot_files.retain(|rel, _| {
        Path::new(rel)
            .file_name()
            .map(|n| n != MANIFEST_FILENAME)
            .unwrap_or(true)
    });

    let mut current_files: BTreeMap<String, PathBuf> = BTreeMap::new();
    for source_dir in source_directories {
        if !source_dir.exists() {
            continue;
        }
        current_files.extend(collect(source_dir, source_path));
    }

    for rel in current_files.keys() {
        if !snapshot_files.contains_key(rel) {
            result.added.push(rel.clone());
        }
    }

    for (rel, snapshot_file) in &snapshot_files {
        match current_files.get(rel) {
            None => result.deleted.push(rel.clone()),
            Some(current_file) => {
                if is_modified(snapshot_file, current_file) {
                    result.modified.push(rel.clone());
                }
            }
        }
    }

    result.added.sort();
    result.modified.sort();
    result.deleted.sort();
    result
}

fn is_modified(snapshot_file: &Path, current_file: &Path) -> bool {
    let (Ok(snap_meta), Ok(curr_meta)) = (
        snapshot_file.symlink_metadata(),
        current_file.symlink_metadata(),
    ) else {
        // Unreadable on either side counts as modified.
        return true;
    };

    if snap_meta.len() != curr_meta.len() {
        return true;
    }

    match (snap_meta.modified(), curr_meta.modified()) {
        (Ok(snap_mtime), Ok(curr_mtime)) if snap_mtime == curr_mtime => false,
        // Size equal but mtime differs (or is unreadable): compare bytes.
        _ => files_differ(snapshot_file, current_file),
    }
}

fn files_differ(a: &Path, b: &Path) -> bool {
    const CHUNK: usize = 8192;

    let (Ok(mut file_a), Ok(mut file_b)) = (File::open(a), File::open(b)) else {
        return true;
    };

    let mut buf_a = [0u8; CHUNK];
    let mut buf_b = [0u8; CHUNK];

    loop {
        let (Ok(read_a), Ok(read_b)) = (
            read_full(&mut file_a, &mut buf_a),
            read_full(&mut file_b, &mut buf_b),
        ) else {
            return true;
        };

        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return true;
        }
        if read_a == 0 {
            return false;
        }
    }
}

// Read until the buffer is full or EOF; plain read() may return short.
fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
