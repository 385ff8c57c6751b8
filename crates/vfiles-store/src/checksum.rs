//! Streaming content checksums.
//!
//! Files are hashed with BLAKE3 in fixed-size blocks so memory use is
//! bounded regardless of file size.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use crate::{IoContext, Result};

/// BLAKE3 hash type (32 bytes)
pub type Blake3Hash = [u8; 32];

/// Default read block size (1 MiB)
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 20;

/// Hash a file with the default block size.
pub fn hash_file(path: &Path) -> Result<Blake3Hash> {
    hash_file_with_block_size(path, DEFAULT_BLOCK_SIZE)
}

/// Hash a file, reading at most `block_size` bytes at a time.
pub fn hash_file_with_block_size(path: &Path, block_size: usize) -> Result<Blake3Hash> {
    let mut file = File::open(path).at("open for hashing", path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; block_size.max(1)];

    loop {
        let n = file.read(&mut buf).at("read for hashing", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(*hasher.finalize().as_bytes())
}

/// Convert a hash to its hex string representation.
#[inline]
pub fn hash_to_hex(hash: &Blake3Hash) -> String {
    hex::encode(hash)
}

/// Compare two files by content.
///
/// Sizes are compared first; files are only hashed when their sizes match.
/// Names and timestamps are ignored.
pub fn files_identical(a: &Path, b: &Path) -> Result<bool> {
    let size_a = fs::metadata(a).at("stat", a)?.len();
    let size_b = fs::metadata(b).at("stat", b)?.len();
    if size_a != size_b {
        return Ok(false);
    }
    Ok(hash_file(a)? == hash_file(b)?)
}
