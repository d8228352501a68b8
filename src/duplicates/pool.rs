//! Bounded worker pool with atomic work claiming and batched write-back.
//!
//! Workers run on a dedicated rayon pool sized to the configured worker
//! count, so hashing never competes with the global rayon pool. Each worker
//! claims the next item through a shared counter: no item is processed twice
//! and no per-item queue is needed. Results flow back to the calling thread,
//! which buffers them and hands full batches to a flush callback. Whatever is
//! buffered is always flushed before the pool returns, whether it finished or
//! was cancelled.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_channel::bounded;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

use crate::signal::CancellationToken;

/// Summary of one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolOutcome {
    /// Items the work function was called on
    pub processed: usize,
    /// Items whose work function returned `None`
    pub failed: usize,
    /// The token stopped the run before every item was processed
    pub cancelled: bool,
}

/// Tuning for [`run_claiming`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Worker threads (at least 1)
    pub workers: usize,
    /// Results per flush (at least 1)
    pub flush_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            flush_size: 100,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn with_flush_size(mut self, flush_size: usize) -> Self {
        self.flush_size = flush_size.max(1);
        self
    }

    /// Build the rayon pool that hosts the workers.
    ///
    /// # Errors
    ///
    /// Returns the rayon error if the threads cannot be spawned.
    pub fn build_pool(&self) -> Result<ThreadPool, ThreadPoolBuildError> {
        ThreadPoolBuilder::new()
            .num_threads(self.workers.max(1))
            .thread_name(|i| format!("duplicatizer-hash-{i}"))
            .build()
    }
}

/// Process `items` on `pool`.
///
/// - `work` runs on pool threads; `None` marks an item as failed (the
///   work function is expected to log why).
/// - `flush` runs on the calling thread with up to `flush_size` results.
/// - `progress` runs on the calling thread after each item with
///   `(done, total)`.
///
/// The token is checked before every claim. If `flush` fails, workers are
/// stopped, remaining results are discarded and the error is returned.
pub fn run_claiming<T, R, E, W, F, P>(
    items: &[T],
    pool: &ThreadPool,
    config: PoolConfig,
    token: &CancellationToken,
    work: W,
    mut flush: F,
    mut progress: P,
) -> Result<PoolOutcome, E>
where
    T: Sync,
    R: Send,
    W: Fn(&T) -> Option<R> + Sync,
    F: FnMut(Vec<R>) -> Result<(), E>,
    P: FnMut(usize, usize),
{
    let total = items.len();
    let mut outcome = PoolOutcome::default();
    if total == 0 {
        return Ok(outcome);
    }

    let next = AtomicUsize::new(0);
    let abort = AtomicBool::new(false);
    let workers = config
        .workers
        .min(pool.current_num_threads())
        .clamp(1, total);
    let flush_size = config.flush_size.max(1);
    let mut failure: Option<E> = None;

    pool.in_place_scope(|scope| {
        let (tx, rx) = bounded::<Option<R>>(flush_size * 2);
        for _ in 0..workers {
            let tx = tx.clone();
            let (next, abort, work) = (&next, &abort, &work);
            scope.spawn(move |_| loop {
                if token.is_cancelled() || abort.load(Ordering::Relaxed) {
                    break;
                }
                let i = next.fetch_add(1, Ordering::SeqCst);
                let Some(item) = items.get(i) else {
                    break;
                };
                if tx.send(work(item)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        let mut buffer = Vec::with_capacity(flush_size);
        for result in rx.iter() {
            outcome.processed += 1;
            match result {
                Some(r) if failure.is_none() => buffer.push(r),
                Some(_) => {}
                None => outcome.failed += 1,
            }
            if buffer.len() >= flush_size {
                if let Err(e) = flush(std::mem::take(&mut buffer)) {
                    abort.store(true, Ordering::SeqCst);
                    failure = Some(e);
                }
            }
            progress(outcome.processed, total);
        }

        if failure.is_none() && !buffer.is_empty() {
            if let Err(e) = flush(buffer) {
                failure = Some(e);
            }
        }
    });

    if let Some(e) = failure {
        return Err(e);
    }
    outcome.cancelled = outcome.processed < total && token.is_cancelled();
    Ok(outcome)
}
