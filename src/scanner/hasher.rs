//! BLAKE3 content hashing for the two hashing tiers.
//!
//! # Overview
//!
//! All functions here are pure over the file's bytes and the size recorded
//! in the index; caching lives in the index, not in memory.
//!
//! - [`partial_hash`]: files below [`PARTIAL_THRESHOLD`] hash their whole
//!   content, which makes the partial hash equal to the full hash. Larger
//!   files hash a [`PARTIAL_SIZE`] window at [`PARTIAL_OFFSET`] followed by
//!   the size, so files sharing a prefix but differing in length never
//!   collide.
//! - [`full_hash`]: files up to [`LARGE_FILE_THRESHOLD`] are streamed in full.
//!   Larger files fall back to [`sample_hash`].
//! - [`sample_hash`]: three [`SAMPLE_CHUNK`] windows at the start, at 60% of
//!   the size, and at the end, in that order, followed by the size. A sampled
//!   hash therefore never equals a streamed one, and two sampled files of
//!   different sizes never share a hash.
//!
//! # Sample hash caveat
//!
//! A sample hash is a heuristic. Two large files of equal size that differ
//! only outside the three sampled windows produce the same full hash and are
//! reported as duplicates. Callers who cannot accept that must verify large
//! groups byte-for-byte before acting on them.
//!
//! Hashes are lowercase hex strings (64 characters).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::HashError;

/// Offset of the partial-hash window.
pub const PARTIAL_OFFSET: u64 = 0x4000;

/// Length of the partial-hash window.
pub const PARTIAL_SIZE: u64 = 0x4000;

/// Files smaller than this hash their whole content for the partial tier.
pub const PARTIAL_THRESHOLD: u64 = PARTIAL_OFFSET + PARTIAL_SIZE;

/// Window length used by [`sample_hash`].
pub const SAMPLE_CHUNK: u64 = 1024 * 1024;

/// Files larger than this get a sample hash instead of a streamed one.
pub const LARGE_FILE_THRESHOLD: u64 = 3 * SAMPLE_CHUNK;

/// Read buffer for streaming.
const STREAM_BUFFER: usize = 64 * 1024;

/// Whether the partial hash of a file this size already is its full hash.
#[must_use]
pub fn partial_is_full(size: u64) -> bool {
    size < PARTIAL_THRESHOLD
}

/// Compute the partial-tier hash of a file.
///
/// `size` is the size recorded in the index for this file.
pub fn partial_hash(path: &Path, size: u64) -> Result<String, HashError> {
    if partial_is_full(size) {
        return stream_hash(path);
    }

    let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
    let mut hasher = blake3::Hasher::new();
    let window = read_window(&mut file, PARTIAL_OFFSET, PARTIAL_SIZE)
        .map_err(|e| HashError::from_io(path, e))?;
    hasher.update(&window);
    hasher.update(&size.to_le_bytes());
    Ok(hasher.finalize().to_hex().to_string())
}

/// Compute the full-tier hash of a file.
///
/// Streams the whole file up to [`LARGE_FILE_THRESHOLD`]; above it the
/// result is a [`sample_hash`].
pub fn full_hash(path: &Path, size: u64) -> Result<String, HashError> {
    if size > LARGE_FILE_THRESHOLD {
        sample_hash(path, size)
    } else {
        stream_hash(path)
    }
}

/// Hash the start, 60% and end windows of a file, then its size.
pub fn sample_hash(path: &Path, size: u64) -> Result<String, HashError> {
    let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
    let mut hasher = blake3::Hasher::new();

    let middle = size / 10 * 6 + (size % 10) * 6 / 10;
    let end = size.saturating_sub(SAMPLE_CHUNK);
    for offset in [0, middle, end] {
        let window = read_window(&mut file, offset, SAMPLE_CHUNK)
            .map_err(|e| HashError::from_io(path, e))?;
        hasher.update(&window);
    }
    hasher.update(&size.to_le_bytes());

    Ok(hasher.finalize().to_hex().to_string())
}

fn stream_hash(path: &Path) -> Result<String, HashError> {
    let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; STREAM_BUFFER];
    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(HashError::from_io(path, e)),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Read up to `len` bytes at `offset`; shorter at end of file.
fn read_window(file: &mut File, offset: u64, len: u64) -> std::io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut window = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
    file.by_ref().take(len).read_to_end(&mut window)?;
    Ok(window)
}
