//! Reversible quarantine of duplicate files with an undo history.
//!
//! # Overview
//!
//! Quarantining moves a file into `<root>/<YYYY-MM-DD>/<name>`, where the
//! date is taken once per batch (UTC). The history row is written and the
//! file row removed only after the move succeeded. Restoring moves the file
//! back and deletes the history row.
//!
//! Every item in a batch is independent: a failure is logged, recorded in
//! the batch result and never rolls back items that already succeeded.
//!
//! # Name collisions
//!
//! If `<name>` already exists in the dated folder, `name(1).ext`,
//! `name(2).ext`, ... is used. Restore never overwrites: if something exists
//! at the original path the item fails with
//! [`QuarantineError::DestinationExists`] and its history row is kept.
//!
//! # Cross-device moves
//!
//! When a rename fails because source and destination are on different
//! filesystems, the file is copied, synced, checked for size, and only then
//! is the source removed.
//!
//! # Example
//!
//! ```no_run
//! use duplicatizer::actions::QuarantineManager;
//! use duplicatizer::index::Index;
//! use std::sync::Arc;
//!
//! let index = Arc::new(Index::open_in_memory().unwrap());
//! let manager = QuarantineManager::new(Arc::clone(&index), "/home/user/Duplicatizer");
//! let result = manager.quarantine(&[1, 2, 3]);
//! println!("{}", result.summary());
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::index::{HistoryRecord, Index, IndexError};

/// Per-item error from a quarantine or restore.
#[derive(Debug, Error)]
pub enum QuarantineError {
    /// The file id is not in the index.
    #[error("unknown file id: {0}")]
    UnknownFile(i64),

    /// The history id does not exist.
    #[error("unknown history id: {0}")]
    UnknownHistory(i64),

    /// The file to move is gone (already moved or deleted).
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Restoring would overwrite an existing file.
    #[error("destination already exists: {0}")]
    DestinationExists(PathBuf),

    /// A cross-device copy produced a file of the wrong size.
    #[error("copy verification failed for {0}")]
    VerifyFailed(PathBuf),

    /// Moving the file failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The move succeeded but could not be recorded; it was rolled back.
    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

impl QuarantineError {
    /// Get the path associated with this error (if any).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound(p)
            | Self::DestinationExists(p)
            | Self::VerifyFailed(p)
            | Self::Io { path: p, .. } => Some(p),
            Self::UnknownFile(_) | Self::UnknownHistory(_) | Self::Index(_) => None,
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// One successful move.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MovedFile {
    /// File id (quarantine) or history id (restore)
    pub id: i64,
    /// Where the file was
    pub from: PathBuf,
    /// Where the file is now
    pub to: PathBuf,
    /// History row created by a quarantine
    pub history_id: Option<i64>,
}

/// Results of a batch quarantine or restore.
#[derive(Debug, Default)]
pub struct BatchMoveResult {
    /// Items that moved.
    pub successes: Vec<MovedFile>,
    /// Items that failed, by id.
    pub failures: Vec<(i64, QuarantineError)>,
}

impl BatchMoveResult {
    /// Number of successful moves.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    /// Number of failed moves.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Check if every item moved.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human-readable summary of the operation.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.all_succeeded() {
            format!("Moved {} file(s)", self.success_count())
        } else {
            format!(
                "Moved {} file(s), {} failed",
                self.success_count(),
                self.failure_count()
            )
        }
    }
}

/// Moves files into and out of the quarantine root.
#[derive(Debug, Clone)]
pub struct QuarantineManager {
    index: Arc<Index>,
    root: PathBuf,
}

impl QuarantineManager {
    #[must_use]
    pub fn new(index: Arc<Index>, root: impl Into<PathBuf>) -> Self {
        Self {
            index,
            root: root.into(),
        }
    }

    /// The quarantine root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Quarantine the files with the given index ids.
    pub fn quarantine(&self, file_ids: &[i64]) -> BatchMoveResult {
        let now = Utc::now();
        let dated_dir = self.root.join(now.format("%Y-%m-%d").to_string());
        let timestamp = now.to_rfc3339();
        let mut result = BatchMoveResult::default();

        for &id in file_ids {
            match self.quarantine_one(id, &dated_dir, &timestamp) {
                Ok(moved) => {
                    log::info!("Quarantined {} -> {}", moved.from.display(), moved.to.display());
                    result.successes.push(moved);
                }
                Err(e) => {
                    log::warn!("Failed to quarantine file {}: {}", id, e);
                    result.failures.push((id, e));
                }
            }
        }
        log::info!("{}", result.summary());
        result
    }

    /// Restore the files recorded under the given history ids.
    pub fn restore(&self, history_ids: &[i64]) -> BatchMoveResult {
        let mut result = BatchMoveResult::default();

        for &id in history_ids {
            let outcome = match self.index.history_by_ids(&[id]) {
                Ok(mut records) => match records.pop() {
                    Some(record) => self.restore_one(&record),
                    None => Err(QuarantineError::UnknownHistory(id)),
                },
                Err(e) => Err(e.into()),
            };
            match outcome {
                Ok(moved) => {
                    log::info!("Restored {} -> {}", moved.from.display(), moved.to.display());
                    result.successes.push(moved);
                }
                Err(e) => {
                    log::warn!("Failed to restore history entry {}: {}", id, e);
                    result.failures.push((id, e));
                }
            }
        }
        log::info!("{}", result.summary());
        result
    }

    fn quarantine_one(
        &self,
        id: i64,
        dated_dir: &Path,
        timestamp: &str,
    ) -> Result<MovedFile, QuarantineError> {
        let record = self
            .index
            .file_by_id(id)?
            .ok_or(QuarantineError::UnknownFile(id))?;
        let source = record.path;
        fs::symlink_metadata(&source).map_err(|e| QuarantineError::io(&source, e))?;

        let file_name = source
            .file_name()
            .ok_or_else(|| QuarantineError::NotFound(source.clone()))?;
        fs::create_dir_all(dated_dir).map_err(|e| QuarantineError::io(dated_dir, e))?;
        let dest = unique_destination(dated_dir, file_name);

        relocate_file(&source, &dest).map_err(|e| match e {
            RelocateError::Io(e) => QuarantineError::io(&source, e),
            RelocateError::SizeMismatch => QuarantineError::VerifyFailed(source.clone()),
        })?;

        match self.index.record_quarantine(id, &source, &dest, timestamp) {
            Ok(history_id) => Ok(MovedFile {
                id,
                from: source,
                to: dest,
                history_id: Some(history_id),
            }),
            Err(e) => {
                if let Err(undo) = relocate_file(&dest, &source) {
                    log::error!(
                        "Could not move {} back after index failure: {}",
                        dest.display(),
                        undo
                    );
                }
                Err(e.into())
            }
        }
    }

    fn restore_one(&self, record: &HistoryRecord) -> Result<MovedFile, QuarantineError> {
        let original = &record.original_path;
        let moved = &record.moved_path;

        if fs::symlink_metadata(original).is_ok() {
            return Err(QuarantineError::DestinationExists(original.clone()));
        }
        fs::symlink_metadata(moved).map_err(|e| QuarantineError::io(moved, e))?;

        if let Some(parent) = original.parent() {
            fs::create_dir_all(parent).map_err(|e| QuarantineError::io(parent, e))?;
        }
        relocate_file(moved, original).map_err(|e| match e {
            RelocateError::Io(e) => QuarantineError::io(moved, e),
            RelocateError::SizeMismatch => QuarantineError::VerifyFailed(moved.clone()),
        })?;

        if let Err(e) = self.index.delete_history(record.id) {
            if let Err(undo) = relocate_file(original, moved) {
                log::error!(
                    "Could not move {} back after index failure: {}",
                    original.display(),
                    undo
                );
            }
            return Err(e.into());
        }

        Ok(MovedFile {
            id: record.id,
            from: moved.clone(),
            to: original.clone(),
            history_id: None,
        })
    }
}

/// Pick a free path for `file_name` inside `dir`.
///
/// Returns `dir/file_name` if unused, otherwise the first free
/// `stem(N).ext` for N = 1, 2, ...
#[must_use]
pub fn unique_destination(dir: &Path, file_name: &std::ffi::OsStr) -> PathBuf {
    let initial = dir.join(file_name);
    if fs::symlink_metadata(&initial).is_err() {
        return initial;
    }
    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = name.extension().and_then(|s| s.to_str()).unwrap_or("");

    let mut counter = 1u32;
    loop {
        let candidate = if ext.is_empty() {
            dir.join(format!("{stem}({counter})"))
        } else {
            dir.join(format!("{stem}({counter}).{ext}"))
        };
        if fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
        counter += 1;
    }
}

/// Failure from [`relocate_file`].
#[derive(Debug, Error)]
pub enum RelocateError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("copied file size does not match source")]
    SizeMismatch,
}

/// Move `src` to `dest`, creating `dest`'s parent. Falls back to
/// copy, sync, verify, remove when a rename crosses filesystems.
pub fn relocate_file(src: &Path, dest: &Path) -> Result<(), RelocateError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(err) if is_cross_device_error(&err) => {
            log::debug!(
                "Cross-device move of {}, copying instead",
                src.display()
            );
            let expected = fs::metadata(src)?.len();
            if let Err(copy_err) = fs::copy(src, dest) {
                let _ = fs::remove_file(dest);
                return Err(copy_err.into());
            }
            let file = fs::File::open(dest)?;
            file.sync_all()?;
            if file.metadata()?.len() != expected {
                let _ = fs::remove_file(dest);
                return Err(RelocateError::SizeMismatch);
            }
            fs::remove_file(src)?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(windows)]
fn is_cross_device_error(err: &io::Error) -> bool {
    // ERROR_NOT_SAME_DEVICE
    err.raw_os_error() == Some(17)
}

#[cfg(not(windows))]
fn is_cross_device_error(err: &io::Error) -> bool {
    // EXDEV
    err.raw_os_error() == Some(18)
}
