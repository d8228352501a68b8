//! Parallel crawler that converges the index to the filesystem.
//!
//! # Overview
//!
//! Each root is walked with jwalk on a rayon pool of `scan_workers` threads.
//! Directory listings are filtered as they are read: pruned directories are
//! dropped before jwalk descends into them, and surviving files are stat-ed
//! on the pool thread that listed them. A feeder thread drives the walk and
//! sends file observations over a channel. The calling thread is the only
//! index writer: it diffs each observation against the snapshot taken at the
//! start, batches changed entries into transactional upserts and reports
//! progress.
//!
//! After a complete (not cancelled, not forced) crawl, indexed paths under
//! the scanned roots that were not observed are removed.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{bounded, Sender};
use jwalk::{Parallelism, WalkDirGeneric};

use super::exclusions::ExclusionSet;
use super::{FileCategory, ScanError, ScanOptions};
use crate::index::{mtime_nanos, FileMetadata, FileStamp, Index, IndexError};
use crate::progress::{EventSink, ProgressEvent};
use crate::signal::CancellationToken;

/// Capacity of the observation channel between the walk and the writer.
const CHANNEL_CAPACITY: usize = 4096;

/// jwalk client state: files carry their stat result out of the pool.
type CrawlState = ((), Option<FileMetadata>);
type CrawlEntry = jwalk::DirEntry<CrawlState>;

/// Errors that abort a crawl. Per-entry I/O failures are not among them.
#[derive(thiserror::Error, Debug)]
pub enum CrawlError {
    /// No roots were selected; nothing is scanned.
    #[error("No scan roots selected")]
    NoRoots,

    /// The index could not be read or written.
    #[error("Index error during crawl: {0}")]
    Index(#[from] IndexError),
}

/// Outcome of one crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Files that passed the filters and were stat-ed
    pub files_seen: usize,
    /// New or changed files written to the index
    pub upserted: usize,
    /// Vanished paths removed from the index
    pub removed: usize,
    /// Directories or files skipped because of I/O errors
    pub skipped: usize,
    /// The run was stopped by the cancellation token
    pub cancelled: bool,
    /// Wall-clock time of the crawl
    pub elapsed: Duration,
}

/// Walks roots and keeps the index's metadata in sync with disk.
#[derive(Debug, Clone)]
pub struct Crawler {
    index: Arc<Index>,
}

impl Crawler {
    #[must_use]
    pub fn new(index: Arc<Index>) -> Self {
        Self { index }
    }

    /// Crawl every root in `options`.
    ///
    /// Emits `ScanProgress` at most once per `progress_interval`, then exactly
    /// one of `ScanComplete` or `ScanCancelled`. Once the token is cancelled
    /// no further observation is written, so the index holds exactly the
    /// batches flushed before that point.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::NoRoots`] before touching the index when
    /// `options.roots` is empty, and [`CrawlError::Index`] if a batch cannot
    /// be written.
    pub fn crawl(
        &self,
        options: &ScanOptions,
        token: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<CrawlReport, CrawlError> {
        if options.roots.is_empty() {
            return Err(CrawlError::NoRoots);
        }
        let start = Instant::now();
        log::info!(
            "Crawling {} root(s) with {} workers{}",
            options.roots.len(),
            options.workers,
            if options.force_refresh { " (forced refresh)" } else { "" }
        );

        let snapshot = if options.force_refresh {
            self.index.clear_files()?;
            HashMap::new()
        } else {
            self.index.diff_snapshot()?
        };

        let exclusions = ExclusionSet::new(options.ignore_system_paths, &options.extra_system_dirs)
            .with_prefixes(self.index.excluded_folders()?)
            .with_prefixes(options.quarantine_dir.clone());

        let roots: Vec<PathBuf> = distinct_roots(&options.roots)
            .into_iter()
            .filter(|root| {
                if exclusions.is_under_prefix(root) {
                    log::info!("Skipping excluded root {}", root.display());
                    return false;
                }
                true
            })
            .collect();

        let abort = AtomicBool::new(false);
        let walker = Walker {
            roots: &roots,
            workers: options.workers,
            categories: &options.categories,
            exclusions: Arc::new(exclusions),
            token,
            abort: &abort,
            skipped: Arc::new(AtomicUsize::new(0)),
        };
        let mut writer = BatchWriter::new(&self.index, &snapshot, options, sink);

        std::thread::scope(|scope| {
            let (tx, rx) = bounded::<FileMetadata>(CHANNEL_CAPACITY);
            let walker = &walker;
            scope.spawn(move || walker.run(&tx));

            for observation in rx.iter() {
                if token.is_cancelled() {
                    break;
                }
                if let Err(e) = writer.observe(observation) {
                    log::error!("Failed to write crawl batch: {}", e);
                    abort.store(true, Ordering::SeqCst);
                    writer.failure.get_or_insert(e);
                }
            }
        });

        if let Err(e) = writer.flush() {
            writer.failure.get_or_insert(e);
        }
        if let Some(e) = writer.failure.take() {
            return Err(e.into());
        }

        let cancelled = token.is_cancelled();
        let mut report = CrawlReport {
            files_seen: writer.seen.len(),
            upserted: writer.upserted,
            removed: 0,
            skipped: walker.skipped.load(Ordering::Relaxed),
            cancelled,
            elapsed: Duration::ZERO,
        };

        if cancelled {
            log::warn!(
                "Crawl cancelled after {} files ({} written)",
                report.files_seen,
                report.upserted
            );
            sink.emit(ProgressEvent::ScanCancelled);
        } else {
            if !options.force_refresh {
                let vanished: Vec<PathBuf> = snapshot
                    .keys()
                    .filter(|path| !writer.seen.contains(*path))
                    .filter(|path| options.roots.iter().any(|root| path.starts_with(root)))
                    .cloned()
                    .collect();
                if !vanished.is_empty() {
                    log::info!("Removing {} vanished files from index", vanished.len());
                    report.removed = self.index.delete_by_paths(&vanished)?;
                }
            }
            log::info!(
                "Crawl finished: {} files, {} new/changed, {} removed, {} skipped",
                report.files_seen,
                report.upserted,
                report.removed,
                report.skipped
            );
            sink.emit(ProgressEvent::ScanComplete {
                count: report.files_seen,
            });
        }

        report.elapsed = start.elapsed();
        Ok(report)
    }
}

/// Drop duplicate roots and roots nested inside another root.
fn distinct_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut sorted: Vec<&PathBuf> = roots.iter().collect();
    sorted.sort_by_key(|root| root.components().count());

    let mut kept: Vec<PathBuf> = Vec::with_capacity(sorted.len());
    for root in sorted {
        if let Some(outer) = kept.iter().find(|outer| root.starts_with(outer)) {
            log::debug!(
                "Root {} is already covered by {}",
                root.display(),
                outer.display()
            );
            continue;
        }
        kept.push(root.clone());
    }
    kept
}

/// Single-writer side of the crawl: diff, batch and report.
struct BatchWriter<'a> {
    index: &'a Index,
    snapshot: &'a HashMap<PathBuf, FileStamp>,
    sink: &'a dyn EventSink,
    batch: Vec<FileMetadata>,
    batch_size: usize,
    seen: HashSet<PathBuf>,
    upserted: usize,
    interval: Duration,
    last_report: Instant,
    failure: Option<IndexError>,
}

impl<'a> BatchWriter<'a> {
    fn new(
        index: &'a Index,
        snapshot: &'a HashMap<PathBuf, FileStamp>,
        options: &ScanOptions,
        sink: &'a dyn EventSink,
    ) -> Self {
        Self {
            index,
            snapshot,
            sink,
            batch: Vec::with_capacity(options.batch_size),
            batch_size: options.batch_size,
            seen: HashSet::new(),
            upserted: 0,
            interval: options.progress_interval,
            last_report: Instant::now(),
            failure: None,
        }
    }

    fn observe(&mut self, file: FileMetadata) -> Result<(), IndexError> {
        if self.failure.is_some() {
            return Ok(());
        }
        if self.snapshot.get(&file.path) != Some(&file.stamp()) {
            self.batch.push(file.clone());
        }
        self.seen.insert(file.path);

        if self.last_report.elapsed() >= self.interval {
            self.sink.emit(ProgressEvent::ScanProgress {
                count: self.seen.len(),
            });
            self.last_report = Instant::now();
        }

        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), IndexError> {
        if self.batch.is_empty() || self.failure.is_some() {
            return Ok(());
        }
        let written = self.index.upsert_many(&self.batch)?;
        log::debug!("Flushed {} index upserts", written);
        self.upserted += written;
        self.batch.clear();
        Ok(())
    }
}

/// Feeder side of the crawl: walks each root and forwards file observations.
struct Walker<'a> {
    roots: &'a [PathBuf],
    workers: usize,
    categories: &'a [FileCategory],
    exclusions: Arc<ExclusionSet>,
    token: &'a CancellationToken,
    abort: &'a AtomicBool,
    skipped: Arc<AtomicUsize>,
}

impl Walker<'_> {
    fn stopped(&self) -> bool {
        self.token.is_cancelled() || self.abort.load(Ordering::Relaxed)
    }

    fn run(&self, tx: &Sender<FileMetadata>) {
        for root in self.roots {
            if self.stopped() {
                return;
            }
            if let Err(e) = fs::metadata(root) {
                skip(&self.skipped, root, e);
                continue;
            }

            for entry in self.walk_dir(root) {
                if self.stopped() {
                    return;
                }
                match entry {
                    Ok(mut entry) => {
                        if let Some(file) = entry.client_state.take() {
                            if tx.send(file).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let path = e.path().map_or_else(|| root.clone(), Path::to_path_buf);
                        let kind = e
                            .io_error()
                            .map_or(std::io::ErrorKind::Other, std::io::Error::kind);
                        skip(&self.skipped, &path, std::io::Error::new(kind, e.to_string()));
                    }
                }
            }
        }
    }

    /// Configure jwalk for one root. Listings are filtered on the pool
    /// threads, before jwalk descends into them.
    fn walk_dir(&self, root: &Path) -> WalkDirGeneric<CrawlState> {
        let exclusions = Arc::clone(&self.exclusions);
        let categories = self.categories.to_vec();
        let token = self.token.clone();
        let skipped = Arc::clone(&self.skipped);

        WalkDirGeneric::<CrawlState>::new(root)
            .parallelism(Parallelism::RayonNewPool(self.workers))
            .skip_hidden(false)
            .follow_links(false)
            .process_read_dir(move |_depth, _dir, _state, children| {
                if token.is_cancelled() {
                    children.clear();
                    return;
                }
                children.retain_mut(|child| match child {
                    Ok(entry) => keep_entry(entry, &exclusions, &categories, &skipped),
                    Err(_) => true,
                });
            })
    }
}

/// Decide whether a listed entry stays in the walk, stat-ing files that do.
fn keep_entry(
    entry: &mut CrawlEntry,
    exclusions: &ExclusionSet,
    categories: &[FileCategory],
    skipped: &AtomicUsize,
) -> bool {
    // Roots are never name-pruned.
    if entry.depth == 0 {
        return true;
    }
    let path = entry.path();
    let file_type = entry.file_type();

    if file_type.is_dir() {
        if exclusions.is_excluded_dir(&path) {
            log::trace!("Pruning directory: {}", path.display());
            return false;
        }
        true
    } else if file_type.is_file() {
        if !FileCategory::allows(categories, &path) {
            return false;
        }
        match fs::metadata(&path) {
            Ok(metadata) => {
                let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                entry.client_state = Some(FileMetadata::new(
                    path,
                    metadata.len(),
                    mtime_nanos(modified),
                ));
                true
            }
            Err(e) => {
                skip(skipped, &path, e);
                false
            }
        }
    } else {
        log::trace!("Skipping non-regular entry: {}", path.display());
        false
    }
}

fn skip(skipped: &AtomicUsize, path: &Path, error: std::io::Error) {
    ScanError::from_io(path, error).log();
    skipped.fetch_add(1, Ordering::Relaxed);
}
