//! SHA-256 checksum computation for manifest files.
//!
//! File contents are streamed in fixed-size chunks to bound memory on
//! large files. Checksums are rendered as 64-character lowercase hex.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use super::errors::{VerifyError, VerifyResult};

const CHUNK_SIZE: usize = 8192;

/// Compute the SHA-256 of a byte slice (hex-encoded).
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex_encode(&hasher.finalize())
}

/// Compute the SHA-256 of an entire file, streamed in chunks.
pub fn compute_file_sha256(path: &Path) -> VerifyResult<String> {
    let file = File::open(path).map_err(|e| VerifyError::io_error_at_path(path, e))?;

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| VerifyError::io_error_at_path(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
