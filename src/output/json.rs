//! JSON output formatter for index queries.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "duplicates": [
//!     {
//!       "hash": "abc123...",
//!       "size": 1024,
//!       "wasted_space": 1024,
//!       "files": [{ "id": 1, "path": "/a/1.txt", "size": 1024, "created_at": "..." }]
//!     }
//!   ],
//!   "summary": {
//!     "duplicate_files": 2,
//!     "duplicate_sets": 1,
//!     "duplicate_folder_groups": 0,
//!     "reclaimable_bytes": 1024,
//!     "exit_code": 0,
//!     "exit_code_name": "DZ000"
//!   }
//! }
//! ```
//!
//! Folder groups, history, stats and move results serialize their record
//! types directly through [`to_json_pretty`].

use std::io::Write;

use serde::Serialize;

use crate::error::ExitCode;
use crate::index::{DuplicateFile, DuplicateGroup, IndexStats};

/// A single duplicate group in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonDuplicateGroup {
    /// BLAKE3 hash as hexadecimal string
    pub hash: String,
    /// File size in bytes
    pub size: u64,
    /// Bytes freed by keeping one copy
    pub wasted_space: u64,
    pub files: Vec<DuplicateFile>,
}

impl From<&DuplicateGroup> for JsonDuplicateGroup {
    fn from(group: &DuplicateGroup) -> Self {
        Self {
            hash: group.hash.clone(),
            size: group.size,
            wasted_space: group.wasted_space(),
            files: group.files.clone(),
        }
    }
}

/// Summary statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    #[serde(flatten)]
    pub stats: IndexStats,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "DZ000")
    pub exit_code_name: String,
}

/// Complete JSON output for the `duplicates` listing.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    pub duplicates: Vec<JsonDuplicateGroup>,
    pub summary: JsonSummary,
}

impl JsonOutput {
    #[must_use]
    pub fn new(groups: &[DuplicateGroup], stats: IndexStats, exit_code: ExitCode) -> Self {
        Self {
            duplicates: groups.iter().map(JsonDuplicateGroup::from).collect(),
            summary: JsonSummary {
                stats,
                exit_code: exit_code.as_i32(),
                exit_code_name: exit_code.code_prefix().to_string(),
            },
        }
    }

    /// Write pretty-printed JSON followed by a newline.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)
    }
}

/// Pretty-print any serializable query result.
pub fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}
