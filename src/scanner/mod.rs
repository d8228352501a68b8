//! Scanner module for filesystem crawling and content hashing.
//!
//! This module provides functionality for:
//! - Parallel directory crawling (jwalk) that converges the index to disk
//! - Directory exclusion (system names, hidden folders, user prefixes)
//! - Tiered BLAKE3 content hashing (partial, full, sampled)
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`crawler`]: Directory traversal, index diffing and pruning
//! - [`exclusions`]: Which directories are never descended into
//! - [`hasher`]: Pure hash functions over file contents
//!
//! # Example
//!
//! ```no_run
//! use duplicatizer::index::Index;
//! use duplicatizer::progress::NullSink;
//! use duplicatizer::scanner::{Crawler, FileCategory, ScanOptions};
//! use duplicatizer::signal::CancellationToken;
//! use std::sync::Arc;
//!
//! let index = Arc::new(Index::open_in_memory().unwrap());
//! let options = ScanOptions::new(vec!["/home/user/Pictures".into()])
//!     .with_categories(vec![FileCategory::Photos]);
//!
//! let report = Crawler::new(index)
//!     .crawl(&options, &CancellationToken::new(), &NullSink)
//!     .unwrap();
//! println!("Saw {} files", report.files_seen);
//! ```

pub mod crawler;
pub mod exclusions;
pub mod hasher;

use std::path::{Path, PathBuf};
use std::time::Duration;

pub use crawler::{CrawlError, CrawlReport, Crawler};
pub use exclusions::ExclusionSet;
pub use hasher::{full_hash, partial_hash, sample_hash};

/// Content categories that restrict which extensions are indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    /// Image files
    Photos,
    /// Audio files
    Music,
    /// Video files
    Videos,
    /// Office documents and text
    Documents,
}

impl FileCategory {
    /// Lowercase extensions belonging to this category.
    #[must_use]
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Photos => &[
                "jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp", "heic", "raw",
            ],
            Self::Music => &["mp3", "wav", "flac", "aac", "ogg", "m4a"],
            Self::Videos => &["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm"],
            Self::Documents => &[
                "pdf", "doc", "docx", "txt", "rtf", "odt", "xls", "xlsx", "ppt", "pptx",
            ],
        }
    }

    /// Check whether `path` has an extension allowed by any of `categories`.
    /// An empty category list allows every file.
    #[must_use]
    pub fn allows(categories: &[FileCategory], path: &Path) -> bool {
        if categories.is_empty() {
            return true;
        }
        let Some(extension) = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_lowercase)
        else {
            return false;
        };
        categories
            .iter()
            .any(|c| c.extensions().contains(&extension.as_str()))
    }
}

/// Input to a crawl.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Directories to walk
    pub roots: Vec<PathBuf>,
    /// Extension allow-list by category; empty means everything
    pub categories: Vec<FileCategory>,
    /// Prune well-known system directories and dot-directories
    pub ignore_system_paths: bool,
    /// Clear the index first and treat everything as new
    pub force_refresh: bool,
    /// Extra directory names pruned alongside the built-in system names
    pub extra_system_dirs: Vec<String>,
    /// Directory that is never indexed (the quarantine root)
    pub quarantine_dir: Option<PathBuf>,
    /// Number of directory-reading threads
    pub workers: usize,
    /// Upserts per index transaction
    pub batch_size: usize,
    /// Minimum time between progress events
    pub progress_interval: Duration,
}

impl ScanOptions {
    /// Options for the given roots with default tuning.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            categories: Vec::new(),
            ignore_system_paths: true,
            force_refresh: false,
            extra_system_dirs: Vec::new(),
            quarantine_dir: None,
            workers: 32,
            batch_size: 1000,
            progress_interval: Duration::from_millis(200),
        }
    }

    #[must_use]
    pub fn with_categories(mut self, categories: Vec<FileCategory>) -> Self {
        self.categories = categories;
        self
    }

    #[must_use]
    pub fn with_ignore_system_paths(mut self, ignore: bool) -> Self {
        self.ignore_system_paths = ignore;
        self
    }

    #[must_use]
    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    #[must_use]
    pub fn with_extra_system_dirs(mut self, names: Vec<String>) -> Self {
        self.extra_system_dirs = names;
        self
    }

    #[must_use]
    pub fn with_quarantine_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.quarantine_dir = dir;
        self
    }

    /// Set the crawl thread count (minimum 1).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the upsert batch size (minimum 1).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// Errors that can occur while reading a single directory or file.
///
/// These never abort a crawl; the entry is logged and skipped.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The path vanished between listing and stat.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Classify an I/O error for the entry at `path`.
    pub(crate) fn from_io(path: &Path, error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Log the skipped entry. Vanished paths are expected during a crawl
    /// and only show up at debug level.
    pub fn log(&self) {
        match self {
            Self::NotFound(path) => {
                log::debug!("Path not found (may have been deleted): {}", path.display());
            }
            _ => log::warn!("{}", self),
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The file was removed before it could be read.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    pub(crate) fn from_io(path: &Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Path of the file that failed.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p) | Self::PermissionDenied(p) => p,
            Self::Io { path, .. } => path,
        }
    }
}
