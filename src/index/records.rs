//! Row types stored in and returned by the index.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Convert a modification time into the integer marker stored in the index.
///
/// Nanoseconds relative to the Unix epoch; times before the epoch are negative.
/// Exact integer equality is what the crawler uses to decide whether a file
/// changed, so no floating point is involved.
#[must_use]
pub fn mtime_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_nanos()).unwrap_or(i64::MAX),
    }
}

/// One indexed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Row identifier used by the quarantine surface
    pub id: i64,
    /// Absolute path (unique key)
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Modification time marker, see [`mtime_nanos`]
    pub mtime: i64,
    /// Hash of a sampled window plus size, if computed for the current metadata
    pub partial_hash: Option<String>,
    /// Content hash, if computed for the current metadata
    pub full_hash: Option<String>,
    /// RFC 3339 insertion timestamp
    pub created_at: String,
}

/// Metadata observed by the crawler, staged for an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: i64,
}

impl FileMetadata {
    #[must_use]
    pub fn new(path: PathBuf, size: u64, mtime: i64) -> Self {
        Self { path, size, mtime }
    }

    /// The (size, mtime) pair used for change detection.
    #[must_use]
    pub fn stamp(&self) -> FileStamp {
        FileStamp {
            size: self.size,
            mtime: self.mtime,
        }
    }
}

/// Last-known (size, mtime) of an indexed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileStamp {
    pub size: u64,
    pub mtime: i64,
}

/// A file eligible for the next hashing tier.
///
/// Carries the metadata it was selected with so a write-back can be rejected
/// if the row changed underneath the hasher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: i64,
    pub path: PathBuf,
    pub size: u64,
    pub mtime: i64,
    /// Present for full-hash candidates.
    pub partial_hash: Option<String>,
}

/// A computed hash waiting to be written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashUpdate {
    pub id: i64,
    pub size: u64,
    pub mtime: i64,
    pub hash: String,
}

impl HashUpdate {
    #[must_use]
    pub fn for_candidate(candidate: &Candidate, hash: String) -> Self {
        Self {
            id: candidate.id,
            size: candidate.size,
            mtime: candidate.mtime,
            hash,
        }
    }
}

/// Filters and pagination for [`crate::index::Index::duplicate_groups`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateFilter {
    /// Substring that at least two members' paths must contain
    pub search: Option<String>,
    /// Minimum file size in bytes
    pub min_size: u64,
    /// Maximum number of groups returned
    pub limit: usize,
    /// Number of groups skipped (groups are ordered by hash)
    pub offset: usize,
}

impl Default for DuplicateFilter {
    fn default() -> Self {
        Self {
            search: None,
            min_size: 0,
            limit: 50,
            offset: 0,
        }
    }
}

impl DuplicateFilter {
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        self.search = if search.is_empty() { None } else { Some(search) };
        self
    }

    #[must_use]
    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }

    #[must_use]
    pub fn with_page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// A member of a duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateFile {
    pub id: i64,
    pub path: PathBuf,
    pub size: u64,
    pub created_at: String,
}

/// Files sharing one full hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub hash: String,
    pub size: u64,
    pub files: Vec<DuplicateFile>,
}

impl DuplicateGroup {
    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Bytes freed by keeping a single copy.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size * (self.files.len().saturating_sub(1) as u64)
    }
}

/// Input row for folder fingerprinting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedFile {
    pub path: PathBuf,
    pub size: u64,
    pub full_hash: String,
}

/// Directories whose (file name, content) pairs are identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderGroup {
    pub fingerprint: String,
    /// Member directories, sorted
    pub folders: Vec<PathBuf>,
    /// Files per directory
    pub file_count: usize,
    /// Bytes per directory
    pub total_size: u64,
}

/// Aggregate duplicate statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Files that belong to a duplicate set
    pub duplicate_files: usize,
    /// Distinct full hashes shared by two or more files
    pub duplicate_sets: usize,
    /// Duplicate folder groups
    pub duplicate_folder_groups: usize,
    /// Bytes freed by keeping one copy of every set
    pub reclaimable_bytes: u64,
}

/// A quarantine move that can be undone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub original_path: PathBuf,
    pub moved_path: PathBuf,
    /// RFC 3339 time of the move
    pub timestamp: String,
}
