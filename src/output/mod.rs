//! Output formatters for index queries.
//!
//! This module provides different output formats:
//! - Text for terminals (colored, human-readable sizes)
//! - JSON for automation and scripting
//! - CSV for spreadsheet import
//!
//! # Example
//!
//! ```no_run
//! use duplicatizer::error::ExitCode;
//! use duplicatizer::index::{DuplicateFilter, Index};
//! use duplicatizer::output::json::JsonOutput;
//!
//! let index = Index::open_in_memory().unwrap();
//! let groups = index.duplicate_groups(&DuplicateFilter::default()).unwrap();
//! let stats = index.stats().unwrap();
//! JsonOutput::new(&groups, stats, ExitCode::Success)
//!     .write_to(std::io::stdout())
//!     .unwrap();
//! ```

pub mod csv;
pub mod json;
pub mod text;

pub use csv::{CsvOutput, CsvOutputError};
pub use json::{to_json_pretty, JsonOutput};
