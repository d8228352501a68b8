//! Two-pass grouping engine over the persistent index.
//!
//! # Overview
//!
//! 1. **Pass 1 - Partial hash**: files sharing a size with another file and
//!    still missing a partial hash are hashed (sampled window plus size).
//! 2. **Pass 2 - Full hash**: files sharing a partial hash with another file
//!    and still missing a full hash are hashed in full.
//! 3. **Groups**: duplicate groups are read straight from the index.
//!
//! Every hash is persisted through the index as the pool flushes, so a
//! cancelled or crashed run loses at most one unflushed batch and the next
//! run resumes from the candidates still missing a hash. A second run over an
//! unchanged index finds no candidates at all.
//!
//! Files below the partial-hash threshold already carry their content hash as
//! the partial hash; pass 2 copies it instead of reading the file again.
//!
//! # Example
//!
//! ```no_run
//! use duplicatizer::duplicates::GroupingEngine;
//! use duplicatizer::index::{DuplicateFilter, Index};
//! use duplicatizer::progress::NullSink;
//! use duplicatizer::signal::CancellationToken;
//! use std::sync::Arc;
//!
//! let index = Arc::new(Index::open_in_memory().unwrap());
//! let engine = GroupingEngine::new(Arc::clone(&index));
//! let report = engine.run(&CancellationToken::new(), &NullSink).unwrap();
//! println!("{} partial, {} full hashes", report.partial.hashed, report.full.hashed);
//!
//! for group in index.duplicate_groups(&DuplicateFilter::default()).unwrap() {
//!     println!("{}: {} copies", group.hash, group.files.len());
//! }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::ThreadPool;

use super::pool::{run_claiming, PoolConfig};
use crate::index::{Candidate, HashUpdate, Index, IndexError};
use crate::progress::{EventSink, ProgressEvent, RateLimiter};
use crate::scanner::hasher::{self, partial_is_full};
use crate::scanner::HashError;
use crate::signal::CancellationToken;

/// Errors that abort a processing run.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// The index could not be queried or updated.
    #[error("Index error during processing: {0}")]
    Index(#[from] IndexError),

    /// The hashing thread pool could not be started.
    #[error("Failed to start hashing threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Configuration for the grouping engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of hashing threads. Default is 4 to prevent disk thrashing.
    pub hash_workers: usize,
    /// Hash results written per index transaction.
    pub flush_size: usize,
    /// Minimum time between progress events.
    pub progress_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hash_workers: 4,
            flush_size: 100,
            progress_interval: Duration::from_millis(200),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_hash_workers(mut self, workers: usize) -> Self {
        self.hash_workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn with_flush_size(mut self, flush_size: usize) -> Self {
        self.flush_size = flush_size.max(1);
        self
    }

    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// Statistics from one hashing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Candidates returned by the index
    pub candidates: usize,
    /// Hashes computed by reading the file
    pub hashed: usize,
    /// Full hashes copied from an existing partial hash
    pub reused: usize,
    /// Files that could not be read
    pub failed: usize,
    /// Results dropped because the file changed after it was selected
    pub stale: usize,
}

/// Outcome of [`GroupingEngine::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingReport {
    /// Pass 1 statistics
    pub partial: PassStats,
    /// Pass 2 statistics
    pub full: PassStats,
    /// The token stopped the run
    pub cancelled: bool,
    /// Wall-clock time of both passes
    pub elapsed: Duration,
}

impl ProcessingReport {
    /// Total files read from disk across both passes.
    #[must_use]
    pub fn files_read(&self) -> usize {
        self.partial.hashed + self.full.hashed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Partial,
    Full,
}

impl Tier {
    fn progress(self, current: usize, total: usize) -> ProgressEvent {
        match self {
            Tier::Partial => ProgressEvent::ProcessingProgress { current, total },
            Tier::Full => ProgressEvent::HashingProgress { current, total },
        }
    }
}

/// Drives the tiered hasher against the index.
#[derive(Debug, Clone)]
pub struct GroupingEngine {
    index: Arc<Index>,
    config: EngineConfig,
}

impl GroupingEngine {
    #[must_use]
    pub fn new(index: Arc<Index>) -> Self {
        Self {
            index,
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Run both hashing passes.
    ///
    /// Each pass starts with a `{ current: 0, total }` update, then emits
    /// `ProcessingProgress` (pass 1) or `HashingProgress` (pass 2) rate
    /// limited per pass, then `ProcessingComplete` or `ProcessingCancelled`.
    ///
    /// # Errors
    ///
    /// Only index failures and a hashing pool that cannot start abort the
    /// run; unreadable files are counted in [`PassStats::failed`] and skipped.
    pub fn run(
        &self,
        token: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<ProcessingReport, EngineError> {
        let start = Instant::now();
        let mut report = ProcessingReport::default();
        let pool = self.pool_config();
        let threads = pool.build_pool()?;

        let candidates = self.index.candidates_by_size_collision()?;
        log::info!("Pass 1: Computing partial hashes for {} files", candidates.len());
        let (stats, cancelled) =
            self.hash_pass(&candidates, Tier::Partial, &threads, pool, token, sink)?;
        report.partial = stats;

        if !cancelled {
            let candidates = self.index.candidates_by_partial_hash_collision()?;
            log::info!("Pass 2: Computing full hashes for {} files", candidates.len());
            let (stats, cancelled) =
                self.hash_pass(&candidates, Tier::Full, &threads, pool, token, sink)?;
            report.full = stats;
            report.cancelled = cancelled;
        } else {
            report.cancelled = true;
        }

        report.elapsed = start.elapsed();
        if report.cancelled {
            log::info!("Processing interrupted by cancellation");
            sink.emit(ProgressEvent::ProcessingCancelled);
        } else {
            log::info!(
                "Processing complete: {} files read, {} reused, {} failed in {:.2?}",
                report.files_read(),
                report.full.reused,
                report.partial.failed + report.full.failed,
                report.elapsed
            );
            sink.emit(ProgressEvent::ProcessingComplete);
        }
        Ok(report)
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig::default()
            .with_workers(self.config.hash_workers)
            .with_flush_size(self.config.flush_size)
    }

    fn hash_pass(
        &self,
        candidates: &[Candidate],
        tier: Tier,
        threads: &ThreadPool,
        pool: PoolConfig,
        token: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<(PassStats, bool), EngineError> {
        let mut stats = PassStats {
            candidates: candidates.len(),
            ..Default::default()
        };
        sink.emit(tier.progress(0, candidates.len()));
        let limiter = RateLimiter::new(sink, self.config.progress_interval);

        let mut written = 0usize;
        let outcome = run_claiming(
            candidates,
            threads,
            pool,
            token,
            |candidate| compute(candidate, tier),
            |batch: Vec<(HashUpdate, bool)>| -> Result<(), IndexError> {
                let submitted = batch.len();
                let mut updates = Vec::with_capacity(submitted);
                for (update, reused) in batch {
                    if reused {
                        stats.reused += 1;
                    } else {
                        stats.hashed += 1;
                    }
                    updates.push(update);
                }
                let applied = match tier {
                    Tier::Partial => self.index.set_partial_hashes(&updates)?,
                    Tier::Full => self.index.set_full_hashes(&updates)?,
                };
                written += applied;
                stats.stale += submitted - applied;
                Ok(())
            },
            |current, total| limiter.emit(tier.progress(current, total)),
        )?;
        stats.failed = outcome.failed;

        log::debug!(
            "{:?} pass wrote {} of {} hashes ({} stale)",
            tier,
            written,
            stats.hashed + stats.reused,
            stats.stale
        );
        Ok((stats, outcome.cancelled))
    }
}

/// Hash one candidate. The flag is true when no file was read.
fn compute(candidate: &Candidate, tier: Tier) -> Option<(HashUpdate, bool)> {
    if tier == Tier::Full && partial_is_full(candidate.size) {
        if let Some(partial) = &candidate.partial_hash {
            return Some((HashUpdate::for_candidate(candidate, partial.clone()), true));
        }
    }

    let result = match tier {
        Tier::Partial => hasher::partial_hash(&candidate.path, candidate.size),
        Tier::Full => hasher::full_hash(&candidate.path, candidate.size),
    };
    match result {
        Ok(hash) => {
            log::trace!("{:?} hash computed: {}", tier, candidate.path.display());
            Some((HashUpdate::for_candidate(candidate, hash), false))
        }
        Err(HashError::NotFound(path)) => {
            log::debug!("File vanished before hashing: {}", path.display());
            None
        }
        Err(e) => {
            log::warn!("Failed to hash {}: {}", candidate.path.display(), e);
            None
        }
    }
}
