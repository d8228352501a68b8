//! File actions module.
//!
//! This module provides functionality for:
//! - Moving duplicates into a dated quarantine folder
//! - Restoring quarantined files from the undo history
//!
//! ```no_run
//! use duplicatizer::actions::QuarantineManager;
//! use duplicatizer::index::Index;
//! use std::sync::Arc;
//!
//! let index = Arc::new(Index::open_in_memory().unwrap());
//! let manager = QuarantineManager::new(index, "/tmp/Duplicatizer");
//! let restored = manager.restore(&[7]);
//! println!("{}", restored.summary());
//! ```

pub mod quarantine;

pub use quarantine::{
    relocate_file, unique_destination, BatchMoveResult, MovedFile, QuarantineError,
    QuarantineManager, RelocateError,
};
