//! Directory pruning rules for the crawler.
//!
//! A directory is pruned (never listed, nor anything below it) when:
//! - its name is a well-known system or tooling directory, or starts with
//!   `.`, and system paths are being ignored
//! - it is, or lies under, a user-excluded prefix
//! - it is, or lies under, the quarantine root
//!
//! Name matching is exact and case-insensitive on the final path component,
//! so `/src/node_modules` is pruned but `/src/node_modules_backup` is not.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Directory names pruned when system paths are ignored.
pub const DEFAULT_SYSTEM_DIRS: &[&str] = &[
    "Windows",
    "Program Files",
    "Program Files (x86)",
    "node_modules",
    ".git",
    "AppData",
    "$Recycle.Bin",
    "System Volume Information",
];

/// Compiled set of pruning rules for one crawl.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    system_names: HashSet<String>,
    skip_hidden: bool,
    prefixes: Vec<PathBuf>,
}

impl ExclusionSet {
    /// Build the name rules. With `ignore_system_paths` off, only prefixes
    /// added later apply.
    #[must_use]
    pub fn new(ignore_system_paths: bool, extra_system_dirs: &[String]) -> Self {
        let system_names = if ignore_system_paths {
            DEFAULT_SYSTEM_DIRS
                .iter()
                .copied()
                .chain(extra_system_dirs.iter().map(String::as_str))
                .map(str::to_lowercase)
                .collect()
        } else {
            HashSet::new()
        };
        Self {
            system_names,
            skip_hidden: ignore_system_paths,
            prefixes: Vec::new(),
        }
    }

    /// Add a path prefix that is pruned regardless of the name rules.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    /// Add several prefixes at once.
    #[must_use]
    pub fn with_prefixes(mut self, prefixes: impl IntoIterator<Item = PathBuf>) -> Self {
        self.prefixes.extend(prefixes);
        self
    }

    /// Check whether a directory should be skipped along with its subtree.
    #[must_use]
    pub fn is_excluded_dir(&self, path: &Path) -> bool {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if self.skip_hidden && name.starts_with('.') {
                return true;
            }
            if self.system_names.contains(&name.to_lowercase()) {
                return true;
            }
        }
        self.is_under_prefix(path)
    }

    /// Check whether `path` equals or lies below any excluded prefix.
    #[must_use]
    pub fn is_under_prefix(&self, path: &Path) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix))
    }
}
