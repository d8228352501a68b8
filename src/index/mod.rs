//! Persistent file index for Duplicatizer.
//!
//! This module provides durable storage for file metadata and content hashes
//! so that subsequent runs only hash files that are new or have changed.
//!
//! # Architecture
//!
//! The index is split into two components:
//!
//! * [`database`]: SQLite-backed persistence, schema management and queries.
//! * [`records`]: The row types read from and written to the index.
//!
//! # Staleness Invalidation
//!
//! Rows are keyed by absolute path. Hash columns are only ever valid for the
//! (size, mtime) pair they were computed against: an upsert that changes
//! either value clears both hashes in the same statement, so a modified file
//! can never be grouped with a stale fingerprint.
//!
//! # Tables
//!
//! * `files` - one row per indexed path
//! * `history` - quarantine moves that can still be restored
//! * `excluded_folders` - path prefixes the crawler never descends into

pub mod database;
pub mod records;

pub use database::{Index, IndexError, IndexResult};
pub use records::{
    mtime_nanos, Candidate, DuplicateFile, DuplicateFilter, DuplicateGroup, FileMetadata,
    FileRecord, FileStamp, FolderGroup, HashUpdate, HashedFile, HistoryRecord, IndexStats,
};
