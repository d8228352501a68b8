//! Command-line interface definitions for Duplicatizer.
//!
//! This module defines all CLI arguments, subcommands, and options using the clap derive API.
//! Global options (verbosity, color, output format, index location) apply to every
//! subcommand.
//!
//! # Example
//!
//! ```bash
//! # Index two trees and group duplicates
//! duplicatizer scan ~/Pictures ~/Backup
//!
//! # List duplicate sets over 1 MB as JSON
//! duplicatizer --output json duplicates --min-size 1MB
//!
//! # Move files 12 and 15 to quarantine, then undo history entry 3
//! duplicatizer quarantine 12 15
//! duplicatizer restore 3
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::scanner::FileCategory;

/// Incremental duplicate file finder with a persistent index.
///
/// Duplicatizer keeps an index of file metadata and content hashes so that
/// rescans only read what changed, and moves duplicates to a dated
/// quarantine folder from which they can be restored.
#[derive(Debug, Parser)]
#[command(name = "duplicatizer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Output format for listings
    #[arg(short, long, value_enum, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Configuration file (default: platform config directory)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Index database (overrides `database_path` from the config)
    #[arg(long, value_name = "PATH", global = true)]
    pub database: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for Duplicatizer.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Index directories, then hash and group duplicates
    Scan(ScanArgs),
    /// List duplicate sets from the index
    Duplicates(DuplicatesArgs),
    /// List groups of identical folders
    Folders,
    /// Show aggregate duplicate statistics
    Stats,
    /// Manage excluded folders
    Exclude {
        #[command(subcommand)]
        command: ExcludeCommand,
    },
    /// List quarantine history, newest first
    History,
    /// Move files (by index id) into the quarantine folder
    Quarantine(IdsArgs),
    /// Move quarantined files back (by history id)
    Restore(IdsArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directories to scan
    #[arg(value_name = "PATH", required = true, num_args = 1..)]
    pub paths: Vec<PathBuf>,

    /// Only index files of these categories (can be specified multiple times)
    #[arg(short, long = "category", value_enum, value_name = "CATEGORY")]
    pub categories: Vec<FileCategory>,

    /// Clear the index and rescan everything
    #[arg(long)]
    pub force: bool,

    /// Also descend into system and hidden directories
    #[arg(long)]
    pub include_system_paths: bool,

    /// Extra directory names to skip (can be specified multiple times)
    #[arg(long = "exclude-name", value_name = "NAME")]
    pub exclude_dir_names: Vec<String>,

    /// Directory-reading threads
    #[arg(long, value_name = "N")]
    pub scan_workers: Option<usize>,

    /// Hashing threads (lower values reduce disk thrashing on HDDs)
    #[arg(long, value_name = "N")]
    pub hash_workers: Option<usize>,
}

/// Arguments for the duplicates subcommand.
#[derive(Debug, Args)]
pub struct DuplicatesArgs {
    /// Only groups where at least two paths contain this text
    #[arg(short, long, value_name = "TEXT")]
    pub search: Option<String>,

    /// Minimum file size to list (e.g., 1KB, 1MB, 1GB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Maximum number of groups
    #[arg(long, value_name = "N", default_value = "50")]
    pub limit: usize,

    /// Number of groups to skip
    #[arg(long, value_name = "N", default_value = "0")]
    pub offset: usize,
}

/// Subcommands of `exclude`.
#[derive(Debug, Subcommand)]
pub enum ExcludeCommand {
    /// Exclude a folder and drop its files from the index
    Add {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Stop excluding a folder
    Remove {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// List excluded folders
    List,
}

/// Identifiers for quarantine and restore.
#[derive(Debug, Args)]
pub struct IdsArgs {
    #[arg(value_name = "ID", required = true, num_args = 1..)]
    pub ids: Vec<i64>,
}

/// Output format for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output for scripting
    Json,
    /// CSV output for spreadsheets
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use duplicatizer::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// assert_eq!(parse_size("1MB").unwrap(), 1_000_000);
/// assert_eq!(parse_size("1MiB").unwrap(), 1_048_576);
/// ```
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// a negative number, or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    // Find where the number ends and the suffix begins
    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    if num < 0.0 {
        return Err("Size cannot be negative".to_string());
    }

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
