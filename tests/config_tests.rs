//! Integration tests for configuration loading.
//!
//! These tests cover the layering of defaults, TOML files, environment
//! variables and CLI flags, plus fallback on invalid input.

use clap::Parser;
use duplicatizer::cli::{Cli, Commands};
use duplicatizer::config::Config;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::tempdir;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Clear all DUPLICATIZER_* environment variables to avoid interference.
fn clear_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("DUPLICATIZER_") {
            std::env::remove_var(key);
        }
    }
}

#[test]
fn test_config_missing_file_uses_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config = Config::load_from_path(temp_dir.path().join("nonexistent.toml"));
    assert_eq!(config, Config::default());
}

#[test]
fn test_config_load_from_toml() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
database_path = "/data/index.db"
quarantine_dir = "/data/quarantine"
hash_workers = 8
ignore_system_paths = false
extra_system_dirs = ["target", "build"]
"#,
    )
    .unwrap();

    let config = Config::load_from_path(&config_path);
    assert_eq!(config.database_path, PathBuf::from("/data/index.db"));
    assert_eq!(config.quarantine_dir, PathBuf::from("/data/quarantine"));
    assert_eq!(config.hash_workers, 8);
    assert!(!config.ignore_system_paths);
    assert_eq!(config.extra_system_dirs, vec!["target", "build"]);
    // Untouched keys keep their defaults
    assert_eq!(config.scan_workers, 32);
}

#[test]
fn test_config_hierarchy_file_env_cli() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "hash_workers = 8\nscan_workers = 10\n").unwrap();

    std::env::set_var("DUPLICATIZER_HASH_WORKERS", "2");
    let mut config = Config::load_from_path(&config_path);
    std::env::remove_var("DUPLICATIZER_HASH_WORKERS");
    assert_eq!(config.hash_workers, 2);
    assert_eq!(config.scan_workers, 10);

    let cli = Cli::try_parse_from([
        "duplicatizer",
        "scan",
        ".",
        "--hash-workers",
        "6",
        "--include-system-paths",
        "--exclude-name",
        "vendor",
    ])
    .unwrap();
    if let Commands::Scan(args) = &cli.command {
        config.merge_scan_args(args);
    }
    assert_eq!(config.hash_workers, 6);
    assert_eq!(config.scan_workers, 10);
    assert!(!config.ignore_system_paths);
    assert_eq!(config.extra_system_dirs, vec!["vendor"]);
}

#[test]
fn test_config_invalid_type_falls_back_to_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "hash_workers = \"eight\"\n").unwrap();

    let config = Config::load_from_path(&config_path);
    assert_eq!(config.hash_workers, 4);
}

#[test]
fn test_config_out_of_range_values_validated() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "hash_workers = 0\nupsert_batch_size = 0\n").unwrap();

    let config = Config::load_from_path(&config_path);
    assert_eq!(config.hash_workers, 4);
    assert_eq!(config.upsert_batch_size, 1000);
}

#[test]
fn test_config_unknown_field_ignored() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "hash_wrokers = 9\n").unwrap();

    let config = Config::load_from_path(&config_path);
    assert_eq!(config.hash_workers, 4);
}

#[test]
fn test_config_save_round_trips() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("nested/config.toml");

    let config = Config {
        hash_workers: 2,
        extra_system_dirs: vec!["cache".to_string()],
        ..Config::default()
    };
    config.save(&config_path).unwrap();

    let saved = fs::read_to_string(&config_path).unwrap();
    assert!(saved.contains("hash_workers = 2"));
    assert_eq!(Config::load_from_path(&config_path), config);
}
