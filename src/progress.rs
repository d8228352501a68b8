//! Progress events and the sinks that consume them.
//!
//! The core never renders anything itself. It emits [`ProgressEvent`]s to an
//! [`EventSink`]; the CLI plugs in [`Progress`] (indicatif bars), tests and
//! embedders use [`ChannelSink`], and [`NullSink`] discards everything.
//! [`RateLimiter`] bounds the volume of progress notifications regardless of
//! dataset size.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;

/// Notifications produced by the crawl and the hashing passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ProgressEvent {
    /// Files observed so far
    ScanProgress { count: usize },
    /// The crawl converged; `count` files observed
    ScanComplete { count: usize },
    /// The crawl stopped on cancellation
    ScanCancelled,
    /// Partial-hash pass position
    ProcessingProgress { current: usize, total: usize },
    /// Full-hash pass position
    HashingProgress { current: usize, total: usize },
    /// Both hashing passes finished
    ProcessingComplete,
    /// A hashing pass stopped on cancellation
    ProcessingCancelled,
}

impl ProgressEvent {
    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ScanProgress { .. } => "scan-progress",
            Self::ScanComplete { .. } => "scan-complete",
            Self::ScanCancelled => "scan-cancelled",
            Self::ProcessingProgress { .. } => "processing-progress",
            Self::HashingProgress { .. } => "hashing-progress",
            Self::ProcessingComplete => "processing-complete",
            Self::ProcessingCancelled => "processing-cancelled",
        }
    }

    /// Intermediate position updates; everything else is terminal.
    #[must_use]
    pub fn is_progress(&self) -> bool {
        matches!(
            self,
            Self::ScanProgress { .. }
                | Self::ProcessingProgress { .. }
                | Self::HashingProgress { .. }
        )
    }

    /// A position update that reached its total.
    fn is_final_step(&self) -> bool {
        match self {
            Self::ProcessingProgress { current, total }
            | Self::HashingProgress { current, total } => current >= total,
            _ => false,
        }
    }
}

/// Receiver of progress events.
///
/// Implementations must be cheap; events are emitted from the thread doing
/// the work.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events into a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<ProgressEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

/// Lets at most one progress update through per interval.
///
/// Terminal events, and updates where `current` reached `total`, always pass
/// so observers see the final state.
pub struct RateLimiter<'a> {
    inner: &'a dyn EventSink,
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl<'a> RateLimiter<'a> {
    #[must_use]
    pub fn new(inner: &'a dyn EventSink, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            last: Mutex::new(None),
        }
    }
}

impl EventSink for RateLimiter<'_> {
    fn emit(&self, event: ProgressEvent) {
        if event.is_progress() && !event.is_final_step() {
            let Ok(mut last) = self.last.lock() else {
                return;
            };
            let now = Instant::now();
            if let Some(previous) = *last {
                if now.duration_since(previous) < self.interval {
                    return;
                }
            }
            *last = Some(now);
        }
        self.inner.emit(event);
    }
}

/// Terminal progress bars using indicatif.
///
/// One spinner for the crawl and one bar per hashing pass.
pub struct Progress {
    multi: MultiProgress,
    scanning: Mutex<Option<ProgressBar>>,
    processing: Mutex<Option<ProgressBar>>,
    hashing: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a reporter. With `quiet`, nothing is drawn.
    ///
    /// # Examples
    ///
    /// ```
    /// use duplicatizer::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            scanning: Mutex::new(None),
            processing: Mutex::new(None),
            hashing: Mutex::new(None),
            quiet,
        }
    }

    fn scanning_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn bar_style(color: &str) -> ProgressStyle {
        ProgressStyle::with_template(&format!(
            "[{{elapsed_precise}}] [{{bar:40.{color}/blue}}] {{pos}}/{{len}} ({{percent}}%) {{msg}} (ETA: {{eta}})"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn scan_bar(&self) -> Option<ProgressBar> {
        let mut slot = self.scanning.lock().ok()?;
        let pb = slot.get_or_insert_with(|| {
            let pb = self.multi.add(ProgressBar::new_spinner());
            pb.set_style(Self::scanning_style());
            pb.set_message("Scanning");
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });
        Some(pb.clone())
    }

    fn pass_bar(
        &self,
        slot: &Mutex<Option<ProgressBar>>,
        total: usize,
        color: &str,
        message: &'static str,
    ) -> Option<ProgressBar> {
        let mut slot = slot.lock().ok()?;
        let pb = slot.get_or_insert_with(|| {
            let pb = self.multi.add(ProgressBar::new(total as u64));
            pb.set_style(Self::bar_style(color));
            pb.set_message(message);
            pb
        });
        pb.set_length(total as u64);
        Some(pb.clone())
    }

    fn finish(slot: &Mutex<Option<ProgressBar>>, message: &'static str) {
        if let Some(pb) = slot.lock().ok().and_then(|mut s| s.take()) {
            pb.finish_with_message(message);
        }
    }
}

impl EventSink for Progress {
    fn emit(&self, event: ProgressEvent) {
        if self.quiet {
            return;
        }
        match event {
            ProgressEvent::ScanProgress { count } => {
                if let Some(pb) = self.scan_bar() {
                    pb.set_position(count as u64);
                }
            }
            ProgressEvent::ScanComplete { count } => {
                if let Some(pb) = self.scan_bar() {
                    pb.set_position(count as u64);
                }
                Self::finish(&self.scanning, "Scan complete");
            }
            ProgressEvent::ScanCancelled => Self::finish(&self.scanning, "Scan cancelled"),
            ProgressEvent::ProcessingProgress { current, total } => {
                if let Some(pb) = self.pass_bar(&self.processing, total, "cyan", "Partial hashing") {
                    pb.set_position(current as u64);
                }
            }
            ProgressEvent::HashingProgress { current, total } => {
                Self::finish(&self.processing, "Partial hashing complete");
                if let Some(pb) = self.pass_bar(&self.hashing, total, "green", "Full hashing") {
                    pb.set_position(current as u64);
                }
            }
            ProgressEvent::ProcessingComplete => {
                Self::finish(&self.processing, "Partial hashing complete");
                Self::finish(&self.hashing, "Full hashing complete");
            }
            ProgressEvent::ProcessingCancelled => {
                Self::finish(&self.processing, "Cancelled");
                Self::finish(&self.hashing, "Cancelled");
            }
        }
    }
}
