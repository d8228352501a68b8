//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Partial-hash pass over size collisions (Pass 1)
//! - Full-hash pass over partial-hash collisions (Pass 2)
//! - Duplicate folder detection from full hashes
//! - The bounded claiming worker pool both passes run on

pub mod engine;
pub mod folders;
pub mod pool;

pub use engine::{EngineConfig, EngineError, GroupingEngine, PassStats, ProcessingReport};
pub use folders::{find_duplicate_folders, folder_fingerprint};
pub use pool::{run_claiming, PoolConfig, PoolOutcome};
