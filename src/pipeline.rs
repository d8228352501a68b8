//! Scan-then-process orchestration as an explicit state machine.
//!
//! ```text
//! Idle -> Scanning -> Processing -> Done
//!            |            |
//!            +------------+-------> Cancelled
//! ```
//!
//! The pipeline runs on one background thread, so a force-refresh clear, the
//! crawl and the hashing passes can never overlap on the same index.
//! Processing only begins once the crawl has finished; a cancelled crawl goes
//! straight to `Cancelled`. A failed run returns to `Idle` and reports its
//! error from [`Pipeline::wait`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crate::duplicates::{EngineConfig, EngineError, GroupingEngine, ProcessingReport};
use crate::index::Index;
use crate::progress::EventSink;
use crate::scanner::crawler::{CrawlError, CrawlReport, Crawler};
use crate::scanner::ScanOptions;
use crate::signal::CancellationToken;

/// Where the pipeline is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Scanning,
    Processing,
    Done,
    Cancelled,
}

impl PipelineState {
    /// A run is in flight.
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Scanning | Self::Processing)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// Errors from starting or waiting on a run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// A run is already scanning or processing.
    #[error("A scan is already running")]
    Busy,

    /// The options cannot start a run.
    #[error("Invalid scan configuration: {0}")]
    Configuration(String),

    /// `wait` was called with no run to wait for.
    #[error("No scan has been started")]
    NotStarted,

    /// The background thread panicked.
    #[error("Scan thread panicked")]
    Panicked,

    #[error(transparent)]
    Crawl(#[from] CrawlError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Result of one finished run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub crawl: CrawlReport,
    /// `None` when the crawl was cancelled and processing skipped
    pub processing: Option<ProcessingReport>,
}

impl PipelineReport {
    #[must_use]
    pub fn outcome(&self) -> RunOutcome {
        let processing_cancelled = self.processing.as_ref().map_or(true, |p| p.cancelled);
        if self.crawl.cancelled || processing_cancelled {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Completed
        }
    }
}

type RunHandle = JoinHandle<Result<PipelineReport, PipelineError>>;

/// Drives crawl and grouping for one index.
pub struct Pipeline {
    index: Arc<Index>,
    engine: EngineConfig,
    sink: Arc<dyn EventSink>,
    state: Arc<Mutex<PipelineState>>,
    token: Mutex<CancellationToken>,
    handle: Mutex<Option<RunHandle>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("engine", &self.engine)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(index: Arc<Index>, engine: EngineConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            index,
            engine,
            sink,
            state: Arc::new(Mutex::new(PipelineState::Idle)),
            token: Mutex::new(CancellationToken::new()),
            handle: Mutex::new(None),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        *lock(&self.state)
    }

    /// Start a run with a fresh cancellation token.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Busy`] while a run is in flight and
    /// [`PipelineError::Configuration`] when no roots are given.
    pub fn start(&self, options: ScanOptions) -> Result<(), PipelineError> {
        self.start_with_token(options, CancellationToken::new())
    }

    /// Start a run observing `token` (for example the Ctrl+C token).
    pub fn start_with_token(
        &self,
        options: ScanOptions,
        token: CancellationToken,
    ) -> Result<(), PipelineError> {
        let mut handle = lock(&self.handle);
        {
            let mut state = lock(&self.state);
            if state.is_running() {
                return Err(PipelineError::Busy);
            }
            if options.roots.is_empty() {
                return Err(PipelineError::Configuration(
                    "no scan roots selected".to_string(),
                ));
            }
            *state = PipelineState::Scanning;
        }
        // A previous run has already finished; its result was not collected.
        if let Some(previous) = handle.take() {
            let _ = previous.join();
        }
        *lock(&self.token) = token.clone();

        let index = Arc::clone(&self.index);
        let sink = Arc::clone(&self.sink);
        let state = Arc::clone(&self.state);
        let engine = self.engine;
        *handle = Some(std::thread::spawn(move || {
            let result = run(&index, engine, &options, &token, sink.as_ref(), &state);
            if result.is_err() {
                *lock(&state) = PipelineState::Idle;
            }
            result
        }));
        Ok(())
    }

    /// Ask the running pass to stop at its next safe point.
    pub fn cancel(&self) {
        if self.state().is_running() {
            log::info!("Cancelling scan");
            lock(&self.token).cancel();
        }
    }

    /// Block until the current run ends.
    ///
    /// # Errors
    ///
    /// The run's crawl or engine error, or [`PipelineError::NotStarted`].
    pub fn wait(&self) -> Result<PipelineReport, PipelineError> {
        let handle = lock(&self.handle).take().ok_or(PipelineError::NotStarted)?;
        handle.join().map_err(|_| PipelineError::Panicked)?
    }
}

fn run(
    index: &Arc<Index>,
    engine: EngineConfig,
    options: &ScanOptions,
    token: &CancellationToken,
    sink: &dyn EventSink,
    state: &Mutex<PipelineState>,
) -> Result<PipelineReport, PipelineError> {
    let crawl = Crawler::new(Arc::clone(index)).crawl(options, token, sink)?;
    if crawl.cancelled {
        log::info!("Scan cancelled, skipping duplicate processing");
        *lock(state) = PipelineState::Cancelled;
        return Ok(PipelineReport {
            crawl,
            processing: None,
        });
    }

    *lock(state) = PipelineState::Processing;
    let processing = GroupingEngine::new(Arc::clone(index))
        .with_config(engine)
        .run(token, sink)?;
    *lock(state) = if processing.cancelled {
        PipelineState::Cancelled
    } else {
        PipelineState::Done
    };
    Ok(PipelineReport {
        crawl,
        processing: Some(processing),
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ChannelSink, NullSink, ProgressEvent};
    use crossbeam_channel::{bounded, Receiver, Sender};
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        for (rel, content) in [("a/1.txt", "X"), ("b/1.txt", "X"), ("c/2.txt", "YY")] {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    fn pipeline(sink: Arc<dyn EventSink>) -> (Arc<Index>, Pipeline) {
        let index = Arc::new(Index::open_in_memory().unwrap());
        let pipeline = Pipeline::new(Arc::clone(&index), EngineConfig::default(), sink);
        (index, pipeline)
    }

    #[test]
    fn test_run_reaches_done() {
        let dir = tree();
        let (sink, rx) = ChannelSink::new();
        let (index, pipeline) = pipeline(Arc::new(sink));
        assert_eq!(pipeline.state(), PipelineState::Idle);

        pipeline.start(ScanOptions::new(vec![dir.path().to_path_buf()])).unwrap();
        let report = pipeline.wait().unwrap();

        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(report.outcome(), RunOutcome::Completed);
        assert_eq!(report.crawl.files_seen, 3);

        let names: Vec<_> = rx.try_iter().filter(|e| !e.is_progress()).map(|e| e.name()).collect();
        assert_eq!(names, vec!["scan-complete", "processing-complete"]);

        let groups = index.duplicate_groups(&Default::default()).unwrap();
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_cancelled_scan_skips_processing() {
        let dir = tree();
        let (sink, rx) = ChannelSink::new();
        let (_index, pipeline) = pipeline(Arc::new(sink));
        let token = CancellationToken::new();
        token.cancel();

        pipeline
            .start_with_token(ScanOptions::new(vec![dir.path().to_path_buf()]), token)
            .unwrap();
        let report = pipeline.wait().unwrap();

        assert_eq!(pipeline.state(), PipelineState::Cancelled);
        assert!(report.processing.is_none());
        assert_eq!(report.outcome(), RunOutcome::Cancelled);
        let events: Vec<ProgressEvent> = rx.try_iter().collect();
        assert!(events.contains(&ProgressEvent::ScanCancelled));
        assert!(!events.iter().any(|e| matches!(
            e,
            ProgressEvent::ProcessingComplete | ProgressEvent::ProcessingProgress { .. }
        )));
    }

    #[test]
    fn test_no_roots_is_configuration_error() {
        let (_index, pipeline) = pipeline(Arc::new(NullSink));
        let err = pipeline.start(ScanOptions::new(Vec::new())).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn test_wait_without_start() {
        let (_index, pipeline) = pipeline(Arc::new(NullSink));
        assert!(matches!(pipeline.wait(), Err(PipelineError::NotStarted)));
    }

    /// Holds the pipeline thread at `scan-complete` until released.
    struct GateSink {
        reached: Sender<()>,
        release: Receiver<()>,
    }

    impl EventSink for GateSink {
        fn emit(&self, event: ProgressEvent) {
            if matches!(event, ProgressEvent::ScanComplete { .. }) {
                let _ = self.reached.send(());
                let _ = self.release.recv();
            }
        }
    }

    #[test]
    fn test_second_start_while_running_is_busy() {
        let dir = tree();
        let (reached_tx, reached_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        let sink = GateSink {
            reached: reached_tx,
            release: release_rx,
        };
        let (_index, pipeline) = pipeline(Arc::new(sink));
        let options = ScanOptions::new(vec![dir.path().to_path_buf()]);

        pipeline.start(options.clone()).unwrap();
        reached_rx.recv().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Scanning);
        assert!(matches!(pipeline.start(options.clone()), Err(PipelineError::Busy)));

        release_tx.send(()).unwrap();
        pipeline.wait().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Done);

        // Restartable once finished.
        pipeline.start(options).unwrap();
        reached_rx.recv().unwrap();
        release_tx.send(()).unwrap();
        assert!(pipeline.wait().is_ok());
    }
}
