//! Cooperative cancellation and Ctrl+C handling.
//!
//! Every long-running call (crawl, hashing passes, the pipeline) takes a
//! [`CancellationToken`] and checks it at safe points: before listing a
//! directory, before stat-ing a file, before claiming a hashing candidate.
//! Cancelling is never an error; callers observe it as a distinct outcome.
//!
//! # Usage
//!
//! ```rust,no_run
//! use duplicatizer::signal::install_handler;
//!
//! let token = install_handler().expect("Failed to install signal handler");
//!
//! // Pass clones of the token to worker threads
//! let worker_token = token.clone();
//! if worker_token.is_cancelled() {
//!     return;
//! }
//! ```
//!
//! When Ctrl+C is received the token is cancelled and the application
//! should exit with code 130 (128 + SIGINT).

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for SIGINT (Ctrl+C) interruption.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared cancellation flag.
///
/// Clones observe the same state, so one clone can be handed to every
/// worker while the owner (or a signal handler) calls [`cancel`].
///
/// [`cancel`]: CancellationToken::cancel
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear a previous cancellation so the token can drive another run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_TOKEN: OnceLock<CancellationToken> = OnceLock::new();

/// Install a Ctrl+C handler that cancels the returned token.
///
/// Calling this more than once (for example from tests running `run_app`
/// in one process) returns the already-installed token, reset to the
/// uncancelled state. If another handler owns the signal, an unhooked
/// token is returned that can still be cancelled manually.
///
/// # Errors
///
/// Currently always succeeds; the `Result` leaves room for platforms where
/// a failed installation should be fatal.
pub fn install_handler() -> Result<CancellationToken, SignalError> {
    if let Some(token) = GLOBAL_TOKEN.get() {
        token.reset();
        return Ok(token.clone());
    }

    let token = CancellationToken::new();
    let hooked = token.clone();

    match ctrlc::set_handler(move || {
        hooked.cancel();
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Cleaning up...");
        let _ = std::io::stderr().flush();
        log::info!("Cancellation signal received");
    }) {
        Ok(()) => {
            let _ = GLOBAL_TOKEN.set(token.clone());
            Ok(token)
        }
        Err(e) => {
            log::debug!("Ctrl+C handler not installed ({}), using unhooked token", e);
            let fallback = GLOBAL_TOKEN.get_or_init(CancellationToken::new);
            fallback.reset();
            Ok(fallback.clone())
        }
    }
}
