//! Duplicatizer - incremental duplicate file finder
//!
//! Keeps a persistent SQLite index of file metadata and content hashes.
//! A crawl records what is on disk; a two-pass hashing engine (partial hash
//! over size collisions, then full hash over partial collisions) finds
//! duplicate files, and folder fingerprints find duplicate directories.
//! Duplicates can be moved to a dated quarantine folder and restored.

pub mod actions;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod index;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::actions::{BatchMoveResult, MovedFile, QuarantineManager};
use crate::cli::{Cli, Commands, DuplicatesArgs, ExcludeCommand, OutputFormat, ScanArgs};
use crate::config::Config;
use crate::error::ExitCode;
use crate::index::{DuplicateFilter, Index, IndexStats};
use crate::output::{text, to_json_pretty, CsvOutput, JsonOutput};
use crate::pipeline::{Pipeline, RunOutcome};
use crate::progress::{EventSink, Progress};

/// Run the command described by `cli`.
///
/// # Errors
///
/// Configuration, index and output failures. Cancellation and per-item
/// move failures are reported through the returned [`ExitCode`].
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    if let Some(database) = &cli.database {
        config.database_path = database.clone();
    }

    let index = Arc::new(Index::open(&config.database_path).with_context(|| {
        format!("Failed to open index at {}", config.database_path.display())
    })?);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let format = cli.output;

    match cli.command {
        Commands::Scan(args) => run_scan(&index, config, &args, format, cli.quiet, &mut out),
        Commands::Duplicates(args) => run_duplicates(&index, &args, format, &mut out),
        Commands::Folders => {
            let groups = index.duplicate_folder_groups()?;
            match format {
                OutputFormat::Text => text::write_folders(&mut out, &groups)?,
                OutputFormat::Json => writeln!(out, "{}", to_json_pretty(&groups)?)?,
                OutputFormat::Csv => CsvOutput::Folders(&groups).write_to(&mut out)?,
            }
            Ok(ExitCode::from_duplicate_count(groups.len()))
        }
        Commands::Stats => {
            let stats = index.stats()?;
            let indexed = index.file_count()?;
            match format {
                OutputFormat::Text => text::write_stats(&mut out, &stats, indexed)?,
                OutputFormat::Json | OutputFormat::Csv => {
                    let report = StatsReport {
                        indexed_files: indexed,
                        stats,
                    };
                    writeln!(out, "{}", to_json_pretty(&report)?)?;
                }
            }
            Ok(ExitCode::Success)
        }
        Commands::Exclude { command } => run_exclude(&index, command, format, &mut out),
        Commands::History => {
            let records = index.history()?;
            match format {
                OutputFormat::Text => text::write_history(&mut out, &records)?,
                OutputFormat::Json => writeln!(out, "{}", to_json_pretty(&records)?)?,
                OutputFormat::Csv => CsvOutput::History(&records).write_to(&mut out)?,
            }
            Ok(ExitCode::Success)
        }
        Commands::Quarantine(args) => {
            let manager = QuarantineManager::new(Arc::clone(&index), &config.quarantine_dir);
            let result = manager.quarantine(&args.ids);
            write_moves(&mut out, &result, format)?;
            Ok(move_exit_code(&result))
        }
        Commands::Restore(args) => {
            let manager = QuarantineManager::new(Arc::clone(&index), &config.quarantine_dir);
            let result = manager.restore(&args.ids);
            write_moves(&mut out, &result, format)?;
            Ok(move_exit_code(&result))
        }
    }
}

#[derive(Serialize)]
struct StatsReport {
    indexed_files: usize,
    #[serde(flatten)]
    stats: IndexStats,
}

#[derive(Serialize)]
struct MoveReport<'a> {
    moved: &'a [MovedFile],
    failed: Vec<MoveFailure>,
}

#[derive(Serialize)]
struct MoveFailure {
    id: i64,
    error: String,
}

fn run_scan<W: Write>(
    index: &Arc<Index>,
    mut config: Config,
    args: &ScanArgs,
    format: OutputFormat,
    quiet: bool,
    out: &mut W,
) -> Result<ExitCode> {
    config.merge_scan_args(args);
    let roots = args
        .paths
        .iter()
        .map(|p| p.canonicalize().with_context(|| format!("Cannot scan {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let options = config
        .scan_options(roots)
        .with_categories(args.categories.clone())
        .with_force_refresh(args.force);

    let token = match signal::install_handler() {
        Ok(token) => token,
        Err(e) => {
            log::warn!("{}; Ctrl+C will not cancel cleanly", e);
            signal::CancellationToken::new()
        }
    };
    let sink: Arc<dyn EventSink> = Arc::new(Progress::new(quiet || format != OutputFormat::Text));
    let pipeline = Pipeline::new(Arc::clone(index), config.engine_config(), sink);
    pipeline.start_with_token(options, token)?;
    let report = pipeline.wait()?;

    if report.outcome() == RunOutcome::Cancelled {
        log::warn!("Scan cancelled; the index keeps all work completed so far");
        return Ok(ExitCode::Interrupted);
    }

    let stats = index.stats()?;
    let exit_code = ExitCode::from_duplicate_count(stats.duplicate_sets);
    match format {
        OutputFormat::Text => {
            writeln!(
                out,
                "Scanned {} files ({} new or changed, {} removed, {} skipped) in {:.2?}",
                report.crawl.files_seen,
                report.crawl.upserted,
                report.crawl.removed,
                report.crawl.skipped,
                report.crawl.elapsed
                    + report
                        .processing
                        .as_ref()
                        .map(|p| p.elapsed)
                        .unwrap_or_default()
            )?;
            text::write_stats(&mut *out, &stats, index.file_count()?)?;
        }
        OutputFormat::Json => {
            let groups = index.duplicate_groups(&DuplicateFilter::default())?;
            JsonOutput::new(&groups, stats, exit_code).write_to(&mut *out)?;
        }
        OutputFormat::Csv => {
            let groups = index.duplicate_groups(&DuplicateFilter::default())?;
            CsvOutput::Duplicates(&groups).write_to(&mut *out)?;
        }
    }
    Ok(exit_code)
}

fn run_duplicates<W: Write>(
    index: &Index,
    args: &DuplicatesArgs,
    format: OutputFormat,
    out: &mut W,
) -> Result<ExitCode> {
    let filter = DuplicateFilter::default()
        .with_search(args.search.clone().unwrap_or_default())
        .with_min_size(args.min_size.unwrap_or(0))
        .with_page(args.limit, args.offset);
    let groups = index.duplicate_groups(&filter)?;
    let exit_code = ExitCode::from_duplicate_count(groups.len());

    match format {
        OutputFormat::Text => text::write_duplicates(&mut *out, &groups)?,
        OutputFormat::Json => {
            JsonOutput::new(&groups, index.stats()?, exit_code).write_to(&mut *out)?;
        }
        OutputFormat::Csv => CsvOutput::Duplicates(&groups).write_to(&mut *out)?,
    }
    Ok(exit_code)
}

fn run_exclude<W: Write>(
    index: &Index,
    command: ExcludeCommand,
    format: OutputFormat,
    out: &mut W,
) -> Result<ExitCode> {
    match command {
        ExcludeCommand::Add { path } => {
            let path = absolute(&path)?;
            let removed = index.add_excluded_folder(&path)?;
            log::info!("Excluded {} ({} indexed files removed)", path.display(), removed);
            writeln!(out, "Excluded {} ({} files removed from index)", path.display(), removed)?;
        }
        ExcludeCommand::Remove { path } => {
            let path = absolute(&path)?;
            if index.remove_excluded_folder(&path)? {
                writeln!(out, "No longer excluding {}", path.display())?;
            } else {
                writeln!(out, "{} was not excluded", path.display())?;
            }
        }
        ExcludeCommand::List => {
            let folders = index.excluded_folders()?;
            match format {
                OutputFormat::Json => writeln!(out, "{}", to_json_pretty(&folders)?)?,
                OutputFormat::Text | OutputFormat::Csv => {
                    for folder in folders {
                        writeln!(out, "{}", folder.display())?;
                    }
                }
            }
        }
    }
    Ok(ExitCode::Success)
}

fn write_moves<W: Write>(out: &mut W, result: &BatchMoveResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text | OutputFormat::Csv => text::write_moves(&mut *out, result)?,
        OutputFormat::Json => {
            let report = MoveReport {
                moved: &result.successes,
                failed: result
                    .failures
                    .iter()
                    .map(|(id, e)| MoveFailure {
                        id: *id,
                        error: e.to_string(),
                    })
                    .collect(),
            };
            writeln!(out, "{}", to_json_pretty(&report)?)?;
        }
    }
    Ok(())
}

fn move_exit_code(result: &BatchMoveResult) -> ExitCode {
    if result.all_succeeded() {
        ExitCode::Success
    } else if result.success_count() > 0 {
        ExitCode::PartialSuccess
    } else {
        ExitCode::GeneralError
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .with_context(|| format!("Invalid path {}", path.display()))
}
