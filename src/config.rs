//! Application configuration management.
//!
//! Settings are layered with `figment`, later layers winning:
//!
//! 1. Built-in defaults
//! 2. `config.toml` in the platform config directory (or `--config PATH`)
//! 3. `DUPLICATIZER_*` environment variables (e.g. `DUPLICATIZER_HASH_WORKERS=8`)
//! 4. CLI flags, applied with [`Config::merge_scan_args`]
//!
//! A file that cannot be parsed falls back to defaults with a warning, and
//! out-of-range values are replaced by [`Config::validated`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{BaseDirs, ProjectDirs};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cli::ScanArgs;
use crate::duplicates::EngineConfig;
use crate::scanner::ScanOptions;

/// Prefix of the environment variables read by [`Config::load`].
pub const ENV_PREFIX: &str = "DUPLICATIZER_";

/// Upper bound on hashing threads.
pub const MAX_HASH_WORKERS: usize = 64;

/// Errors from locating or writing the configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine the platform configuration directory")]
    NoProjectDirs,

    #[error("Failed to write config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite index location.
    pub database_path: PathBuf,
    /// Root of the dated quarantine folders.
    pub quarantine_dir: PathBuf,
    /// Directory-reading threads (I/O bound).
    pub scan_workers: usize,
    /// Hashing threads (CPU and disk bound).
    pub hash_workers: usize,
    /// Upserts per crawl transaction.
    pub upsert_batch_size: usize,
    /// Hash results per write-back transaction.
    pub hash_flush_size: usize,
    /// Minimum time between progress notifications.
    pub progress_interval_ms: u64,
    /// Prune well-known system and hidden directories.
    pub ignore_system_paths: bool,
    /// Directory names pruned in addition to the built-in list.
    pub extra_system_dirs: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            quarantine_dir: default_quarantine_dir(),
            scan_workers: 32,
            hash_workers: 4,
            upsert_batch_size: 1000,
            hash_flush_size: 100,
            progress_interval_ms: 200,
            ignore_system_paths: true,
            extra_system_dirs: Vec::new(),
        }
    }
}

impl Config {
    /// Load from the default platform path plus environment.
    #[must_use]
    pub fn load() -> Self {
        match Self::config_path() {
            Ok(path) => Self::load_from_path(path),
            Err(e) => {
                log::debug!("{}, using defaults", e);
                Self::from_figment(Self::figment(None))
            }
        }
    }

    /// Load from `path` plus environment. A missing file is not an error.
    #[must_use]
    pub fn load_from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if path.exists() {
            log::debug!("Loading config from {}", path.display());
        }
        Self::from_figment(Self::figment(Some(path)))
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    fn from_figment(figment: Figment) -> Self {
        match figment.extract::<Config>() {
            Ok(config) => config.validated(),
            Err(e) => {
                log::warn!("Invalid configuration, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Replace out-of-range values with defaults.
    #[must_use]
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.scan_workers == 0 {
            log::warn!("scan_workers must be at least 1, using {}", defaults.scan_workers);
            self.scan_workers = defaults.scan_workers;
        }
        if self.hash_workers == 0 || self.hash_workers > MAX_HASH_WORKERS {
            log::warn!(
                "hash_workers must be between 1 and {}, using {}",
                MAX_HASH_WORKERS,
                defaults.hash_workers
            );
            self.hash_workers = defaults.hash_workers;
        }
        if self.upsert_batch_size == 0 {
            log::warn!(
                "upsert_batch_size must be at least 1, using {}",
                defaults.upsert_batch_size
            );
            self.upsert_batch_size = defaults.upsert_batch_size;
        }
        if self.hash_flush_size == 0 {
            log::warn!(
                "hash_flush_size must be at least 1, using {}",
                defaults.hash_flush_size
            );
            self.hash_flush_size = defaults.hash_flush_size;
        }
        self
    }

    /// Apply `scan` flags on top of the loaded configuration.
    pub fn merge_scan_args(&mut self, args: &ScanArgs) {
        if let Some(workers) = args.scan_workers {
            self.scan_workers = workers.max(1);
        }
        if let Some(workers) = args.hash_workers {
            self.hash_workers = workers.clamp(1, MAX_HASH_WORKERS);
        }
        if args.include_system_paths {
            self.ignore_system_paths = false;
        }
        self.extra_system_dirs
            .extend(args.exclude_dir_names.iter().cloned());
    }

    /// Crawl options for `roots` from this configuration.
    #[must_use]
    pub fn scan_options(&self, roots: Vec<PathBuf>) -> ScanOptions {
        ScanOptions::new(roots)
            .with_ignore_system_paths(self.ignore_system_paths)
            .with_extra_system_dirs(self.extra_system_dirs.clone())
            .with_quarantine_dir(Some(self.quarantine_dir.clone()))
            .with_workers(self.scan_workers)
            .with_batch_size(self.upsert_batch_size)
            .with_progress_interval(self.progress_interval())
    }

    /// Hashing engine settings from this configuration.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_hash_workers(self.hash_workers)
            .with_flush_size(self.hash_flush_size)
            .with_progress_interval(self.progress_interval())
    }

    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Write this configuration as TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Default platform-specific configuration file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        project_dirs()
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or(ConfigError::NoProjectDirs)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "duplicatizer", "duplicatizer")
}

fn default_database_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("index.db"))
        .unwrap_or_else(|| PathBuf::from("duplicatizer.db"))
}

fn default_quarantine_dir() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join("Duplicatizer"))
        .unwrap_or_else(|| PathBuf::from("Duplicatizer"))
}
