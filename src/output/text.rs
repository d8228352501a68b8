//! Human-readable terminal output.
//!
//! Colors come from `yansi` and respect `--no-color` / `NO_COLOR` through
//! [`yansi::disable`], which the binary calls before rendering.

use std::io::{self, Write};

use bytesize::ByteSize;
use yansi::Paint;

use crate::actions::BatchMoveResult;
use crate::index::{DuplicateGroup, FolderGroup, HistoryRecord, IndexStats};

/// Format a byte count with IEC units.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    ByteSize::b(bytes).to_string()
}

pub fn write_duplicates<W: Write>(mut w: W, groups: &[DuplicateGroup]) -> io::Result<()> {
    if groups.is_empty() {
        return writeln!(w, "No duplicates found.");
    }
    for group in groups {
        writeln!(
            w,
            "{} {} x {} ({} wasted)",
            short_hash(&group.hash).bold(),
            group.len(),
            format_size(group.size),
            format_size(group.wasted_space()).yellow()
        )?;
        for file in &group.files {
            writeln!(w, "  [{}] {}", file.id.dim(), file.path.display())?;
        }
    }
    Ok(())
}

pub fn write_folders<W: Write>(mut w: W, groups: &[FolderGroup]) -> io::Result<()> {
    if groups.is_empty() {
        return writeln!(w, "No duplicate folders found.");
    }
    for group in groups {
        writeln!(
            w,
            "{} {} folders, {} file(s), {} each",
            short_hash(&group.fingerprint).bold(),
            group.folders.len(),
            group.file_count,
            format_size(group.total_size)
        )?;
        for folder in &group.folders {
            writeln!(w, "  {}", folder.display())?;
        }
    }
    Ok(())
}

pub fn write_history<W: Write>(mut w: W, records: &[HistoryRecord]) -> io::Result<()> {
    if records.is_empty() {
        return writeln!(w, "History is empty.");
    }
    for record in records {
        writeln!(
            w,
            "[{}] {} {} -> {}",
            record.id.bold(),
            record.timestamp.dim(),
            record.original_path.display(),
            record.moved_path.display()
        )?;
    }
    Ok(())
}

pub fn write_stats<W: Write>(mut w: W, stats: &IndexStats, indexed: usize) -> io::Result<()> {
    writeln!(w, "Indexed files:           {}", indexed)?;
    writeln!(w, "Duplicate files:         {}", stats.duplicate_files)?;
    writeln!(w, "Duplicate sets:          {}", stats.duplicate_sets)?;
    writeln!(w, "Duplicate folder groups: {}", stats.duplicate_folder_groups)?;
    writeln!(
        w,
        "Reclaimable space:       {}",
        format_size(stats.reclaimable_bytes).green().bold()
    )
}

pub fn write_moves<W: Write>(mut w: W, result: &BatchMoveResult) -> io::Result<()> {
    for moved in &result.successes {
        writeln!(
            w,
            "{} {} -> {}",
            "moved".green(),
            moved.from.display(),
            moved.to.display()
        )?;
    }
    for (id, err) in &result.failures {
        writeln!(w, "{} [{}] {}", "failed".red(), id, err)?;
    }
    writeln!(w, "{}", result.summary())
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
