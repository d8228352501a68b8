//! CSV output formatter for index queries.
//!
//! One row per file (duplicates), per folder (folder groups) or per history
//! entry. Group ids are 1-based positions in the listing.
//!
//! # Duplicate columns
//!
//! - `group_id`: position of the group in the listing
//! - `hash`: BLAKE3 content hash (hexadecimal)
//! - `id`: index id of the file (used by `quarantine`)
//! - `path`: path of the file
//! - `size`: file size in bytes
//! - `created_at`: when the file was first indexed

use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::index::{DuplicateGroup, FolderGroup, HistoryRecord};

/// Errors that can occur during CSV output generation.
#[derive(Debug, Error)]
pub enum CsvOutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct DuplicateRow<'a> {
    group_id: usize,
    hash: &'a str,
    id: i64,
    path: String,
    size: u64,
    created_at: &'a str,
}

#[derive(Debug, Serialize)]
struct FolderRow<'a> {
    group_id: usize,
    fingerprint: &'a str,
    folder: String,
    file_count: usize,
    total_size: u64,
}

#[derive(Debug, Serialize)]
struct HistoryRow<'a> {
    id: i64,
    original_path: String,
    moved_path: String,
    timestamp: &'a str,
}

/// CSV output formatter.
pub enum CsvOutput<'a> {
    Duplicates(&'a [DuplicateGroup]),
    Folders(&'a [FolderGroup]),
    History(&'a [HistoryRecord]),
}

impl CsvOutput<'_> {
    /// Write the CSV output to the given writer.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvOutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        match self {
            Self::Duplicates(groups) => {
                for (idx, group) in groups.iter().enumerate() {
                    for file in &group.files {
                        csv_writer.serialize(DuplicateRow {
                            group_id: idx + 1,
                            hash: &group.hash,
                            id: file.id,
                            path: file.path.to_string_lossy().into_owned(),
                            size: file.size,
                            created_at: &file.created_at,
                        })?;
                    }
                }
            }
            Self::Folders(groups) => {
                for (idx, group) in groups.iter().enumerate() {
                    for folder in &group.folders {
                        csv_writer.serialize(FolderRow {
                            group_id: idx + 1,
                            fingerprint: &group.fingerprint,
                            folder: folder.to_string_lossy().into_owned(),
                            file_count: group.file_count,
                            total_size: group.total_size,
                        })?;
                    }
                }
            }
            Self::History(records) => {
                for record in records.iter() {
                    csv_writer.serialize(HistoryRow {
                        id: record.id,
                        original_path: record.original_path.to_string_lossy().into_owned(),
                        moved_path: record.moved_path.to_string_lossy().into_owned(),
                        timestamp: &record.timestamp,
                    })?;
                }
            }
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Generate CSV output as a string.
    pub fn to_string(&self) -> Result<String, CsvOutputError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}
