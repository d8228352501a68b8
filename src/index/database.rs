//! SQLite-backed persistent file index.

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::records::{
    Candidate, DuplicateFile, DuplicateFilter, DuplicateGroup, FileMetadata, FileRecord,
    FileStamp, FolderGroup, HashUpdate, HashedFile, HistoryRecord, IndexStats,
};

/// Bumped whenever the `files` table changes shape.
const SCHEMA_VERSION: i64 = 1;

/// Errors from index operations.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// Underlying SQLite failure
    #[error("Index database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create the database directory
    #[error("Index I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding the connection
    #[error("Index connection lock poisoned")]
    Poisoned,
}

/// Result type for index operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Durable store of file metadata, content hashes, quarantine history and
/// excluded folders.
///
/// The connection is guarded by a mutex so one `Index` can be shared between
/// the crawler, the hashing pool and the query surface. Every multi-row write
/// runs in a single transaction.
pub struct Index {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index").field("path", &self.path).finish()
    }
}

impl Index {
    /// Open or create the index at `path`, creating parent directories.
    pub fn open(path: &Path) -> IndexResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let index = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        index.configure_pragmas()?;
        index.migrate_schema()?;
        log::debug!("Opened index at {}", path.display());
        Ok(index)
    }

    /// Open a private in-memory index.
    pub fn open_in_memory() -> IndexResult<Self> {
        let index = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        };
        index.configure_pragmas()?;
        index.migrate_schema()?;
        Ok(index)
    }

    /// Location of the database file, `None` for in-memory indexes.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> IndexResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| IndexError::Poisoned)
    }

    fn configure_pragmas(&self) -> IndexResult<()> {
        self.conn()?.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA cache_size = -16000;",
        )?;
        Ok(())
    }

    /// Rebuild `files` when the stored schema predates the hash columns.
    /// File rows are recomputable; history and exclusions are kept.
    fn migrate_schema(&self) -> IndexResult<()> {
        let conn = self.conn()?;
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version < SCHEMA_VERSION {
            log::debug!(
                "Index schema version {} < {}, rebuilding files table",
                version,
                SCHEMA_VERSION
            );
            conn.execute_batch("DROP TABLE IF EXISTS files;")?;
        }

        conn.execute_batch(include_str!("schema.sql"))?;
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Crawler writes
    // ------------------------------------------------------------------

    /// Insert or update a batch of file metadata in one transaction.
    ///
    /// Existing rows keep their hashes only when both size and mtime are
    /// unchanged; otherwise both hash columns are cleared together with the
    /// metadata update.
    pub fn upsert_many(&self, records: &[FileMetadata]) -> IndexResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO files (path, size, mtime) VALUES (?1, ?2, ?3)
                 ON CONFLICT(path) DO UPDATE SET
                     partial_hash = CASE
                         WHEN files.size = excluded.size AND files.mtime = excluded.mtime
                         THEN files.partial_hash ELSE NULL END,
                     full_hash = CASE
                         WHEN files.size = excluded.size AND files.mtime = excluded.mtime
                         THEN files.full_hash ELSE NULL END,
                     size = excluded.size,
                     mtime = excluded.mtime",
            )?;
            for record in records {
                stmt.execute(params![
                    path_to_sql(&record.path),
                    size_to_sql(record.size),
                    record.mtime
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Snapshot of every indexed path with its last-known (size, mtime).
    pub fn diff_snapshot(&self) -> IndexResult<HashMap<PathBuf, FileStamp>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT path, size, mtime FROM files")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                PathBuf::from(row.get::<_, String>(0)?),
                FileStamp {
                    size: size_from_sql(row.get(1)?),
                    mtime: row.get(2)?,
                },
            ))
        })?;
        let mut snapshot = HashMap::new();
        for row in rows {
            let (path, stamp) = row?;
            snapshot.insert(path, stamp);
        }
        Ok(snapshot)
    }

    /// Delete rows by exact path. Returns the number of rows removed.
    pub fn delete_by_paths(&self, paths: &[PathBuf]) -> IndexResult<usize> {
        if paths.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM files WHERE path = ?1")?;
            for path in paths {
                removed += stmt.execute([path_to_sql(path)])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Delete the row at `prefix` and every row below it.
    ///
    /// Both `/` and `\` are accepted as the separator following the prefix,
    /// so `/a/b` removes `/a/b/x` and `/a/b\x` but not `/a/bc`.
    pub fn delete_by_prefix(&self, prefix: &Path) -> IndexResult<usize> {
        let conn = self.conn()?;
        delete_prefix(&conn, prefix)
    }

    /// Remove every file row. History and exclusions are untouched.
    pub fn clear_files(&self) -> IndexResult<usize> {
        let removed = self.conn()?.execute("DELETE FROM files", [])?;
        log::info!("Cleared {} indexed files", removed);
        Ok(removed)
    }

    /// Number of indexed files.
    pub fn file_count(&self) -> IndexResult<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count_from_sql(count))
    }

    // ------------------------------------------------------------------
    // Hasher reads and writes
    // ------------------------------------------------------------------

    /// Files without a partial hash whose size is shared with another file.
    pub fn candidates_by_size_collision(&self) -> IndexResult<Vec<Candidate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, path, size, mtime, partial_hash FROM files
             WHERE partial_hash IS NULL
               AND size IN (SELECT size FROM files GROUP BY size HAVING COUNT(*) > 1)
             ORDER BY size, path",
        )?;
        let rows = stmt.query_map([], candidate_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Files without a full hash whose partial hash is shared with another file.
    pub fn candidates_by_partial_hash_collision(&self) -> IndexResult<Vec<Candidate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, path, size, mtime, partial_hash FROM files
             WHERE full_hash IS NULL
               AND partial_hash IN (
                   SELECT partial_hash FROM files
                   WHERE partial_hash IS NOT NULL
                   GROUP BY partial_hash HAVING COUNT(*) > 1)
             ORDER BY partial_hash, path",
        )?;
        let rows = stmt.query_map([], candidate_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Write back partial hashes. An update is dropped if the row's size or
    /// mtime no longer match the values it was computed for.
    pub fn set_partial_hashes(&self, updates: &[HashUpdate]) -> IndexResult<usize> {
        self.set_hashes(
            "UPDATE files SET partial_hash = ?1 WHERE id = ?2 AND size = ?3 AND mtime = ?4",
            updates,
        )
    }

    /// Write back full hashes with the same staleness guard as
    /// [`Index::set_partial_hashes`].
    pub fn set_full_hashes(&self, updates: &[HashUpdate]) -> IndexResult<usize> {
        self.set_hashes(
            "UPDATE files SET full_hash = ?1 WHERE id = ?2 AND size = ?3 AND mtime = ?4",
            updates,
        )
    }

    fn set_hashes(&self, sql: &str, updates: &[HashUpdate]) -> IndexResult<usize> {
        if updates.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut applied = 0;
        {
            let mut stmt = tx.prepare_cached(sql)?;
            for update in updates {
                applied += stmt.execute(params![
                    update.hash,
                    update.id,
                    size_to_sql(update.size),
                    update.mtime
                ])?;
            }
        }
        tx.commit()?;
        if applied < updates.len() {
            log::debug!(
                "Dropped {} stale hash updates",
                updates.len() - applied
            );
        }
        Ok(applied)
    }

    // ------------------------------------------------------------------
    // Query surface
    // ------------------------------------------------------------------

    /// Files grouped by full hash, groups of two or more, ordered by hash.
    pub fn duplicate_groups(&self, filter: &DuplicateFilter) -> IndexResult<Vec<DuplicateGroup>> {
        let conn = self.conn()?;

        let mut sql = String::from("SELECT full_hash FROM files WHERE full_hash IS NOT NULL");
        let mut args: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(search) = &filter.search {
            sql.push_str(" AND path LIKE ? ESCAPE '!'");
            args.push(format!("%{}%", escape_like(search)).into());
        }
        if filter.min_size > 0 {
            sql.push_str(" AND size >= ?");
            args.push(size_to_sql(filter.min_size).into());
        }
        sql.push_str(" GROUP BY full_hash HAVING COUNT(*) > 1 ORDER BY full_hash LIMIT ? OFFSET ?");
        args.push(count_to_sql(filter.limit).into());
        args.push(count_to_sql(filter.offset).into());

        let hashes: Vec<String> = {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(args), |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };

        let mut stmt = conn.prepare_cached(
            "SELECT id, path, size, created_at FROM files WHERE full_hash = ?1 ORDER BY path",
        )?;
        let mut groups = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let files = stmt
                .query_map([&hash], |row| {
                    Ok(DuplicateFile {
                        id: row.get(0)?,
                        path: PathBuf::from(row.get::<_, String>(1)?),
                        size: size_from_sql(row.get(2)?),
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            let size = files.first().map_or(0, |f| f.size);
            groups.push(DuplicateGroup { hash, size, files });
        }
        Ok(groups)
    }

    /// Every file with a full hash, the input to folder fingerprinting.
    pub fn hashed_files(&self) -> IndexResult<Vec<HashedFile>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT path, size, full_hash FROM files WHERE full_hash IS NOT NULL")?;
        let rows = stmt.query_map([], |row| {
            Ok(HashedFile {
                path: PathBuf::from(row.get::<_, String>(0)?),
                size: size_from_sql(row.get(1)?),
                full_hash: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Directories with identical (file name, content) sets.
    pub fn duplicate_folder_groups(&self) -> IndexResult<Vec<FolderGroup>> {
        let files = self.hashed_files()?;
        Ok(crate::duplicates::folders::find_duplicate_folders(&files))
    }

    /// Aggregate duplicate statistics.
    pub fn stats(&self) -> IndexResult<IndexStats> {
        let (files, sets, reclaimable) = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT COALESCE(SUM(cnt), 0), COUNT(*), COALESCE(SUM(size * (cnt - 1)), 0)
                 FROM (SELECT COUNT(*) AS cnt, MAX(size) AS size FROM files
                       WHERE full_hash IS NOT NULL
                       GROUP BY full_hash HAVING COUNT(*) > 1)",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )?
        };
        let folder_groups = self.duplicate_folder_groups()?.len();
        Ok(IndexStats {
            duplicate_files: count_from_sql(files),
            duplicate_sets: count_from_sql(sets),
            duplicate_folder_groups: folder_groups,
            reclaimable_bytes: size_from_sql(reclaimable),
        })
    }

    /// Look up one file row by id.
    pub fn file_by_id(&self, id: i64) -> IndexResult<Option<FileRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, path, size, mtime, partial_hash, full_hash, created_at
             FROM files WHERE id = ?1",
        )?;
        stmt.query_row([id], record_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Look up file rows by id, skipping ids that are not indexed.
    pub fn files_by_ids(&self, ids: &[i64]) -> IndexResult<Vec<FileRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(record) = self.file_by_id(id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Look up a file row by its path.
    pub fn file_by_path(&self, path: &Path) -> IndexResult<Option<FileRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, path, size, mtime, partial_hash, full_hash, created_at
             FROM files WHERE path = ?1",
        )?;
        stmt.query_row([path_to_sql(path)], record_from_row)
            .optional()
            .map_err(Into::into)
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Record a completed quarantine move: the history row is inserted and
    /// the file row removed in one transaction. Returns the history id.
    pub fn record_quarantine(
        &self,
        file_id: i64,
        original: &Path,
        moved: &Path,
        timestamp: &str,
    ) -> IndexResult<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO history (original_path, moved_path, timestamp) VALUES (?1, ?2, ?3)",
            params![path_to_sql(original), path_to_sql(moved), timestamp],
        )?;
        let history_id = tx.last_insert_rowid();
        tx.execute("DELETE FROM files WHERE id = ?1", [file_id])?;
        tx.commit()?;
        Ok(history_id)
    }

    /// All history rows, newest first.
    pub fn history(&self) -> IndexResult<Vec<HistoryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, original_path, moved_path, timestamp FROM history
             ORDER BY timestamp DESC, id DESC",
        )?;
        let rows = stmt.query_map([], history_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// History rows by id, skipping unknown ids.
    pub fn history_by_ids(&self, ids: &[i64]) -> IndexResult<Vec<HistoryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, original_path, moved_path, timestamp FROM history WHERE id = ?1",
        )?;
        let mut records = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(record) = stmt.query_row([id], history_from_row).optional()? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Delete a history row. Returns `false` if it did not exist.
    pub fn delete_history(&self, id: i64) -> IndexResult<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM history WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    // ------------------------------------------------------------------
    // Excluded folders
    // ------------------------------------------------------------------

    /// Exclude a folder and purge every indexed file under it.
    /// Returns the number of file rows removed.
    pub fn add_excluded_folder(&self, folder: &Path) -> IndexResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO excluded_folders (path) VALUES (?1)",
            [path_to_sql(folder)],
        )?;
        let removed = delete_prefix(&tx, folder)?;
        tx.commit()?;
        log::info!(
            "Excluded {} ({} indexed files removed)",
            folder.display(),
            removed
        );
        Ok(removed)
    }

    /// Stop excluding a folder. Files reappear only after a rescan.
    pub fn remove_excluded_folder(&self, folder: &Path) -> IndexResult<bool> {
        let removed = self.conn()?.execute(
            "DELETE FROM excluded_folders WHERE path = ?1",
            [path_to_sql(folder)],
        )?;
        Ok(removed > 0)
    }

    /// All excluded folder prefixes, sorted.
    pub fn excluded_folders(&self) -> IndexResult<Vec<PathBuf>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT path FROM excluded_folders ORDER BY path")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0).map(PathBuf::from))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn delete_prefix(conn: &Connection, prefix: &Path) -> IndexResult<usize> {
    let raw = path_to_sql(prefix);
    let base = raw.trim_end_matches(['/', '\\']);
    let with_slash = format!("{base}/");
    let with_backslash = format!("{base}\\");
    let len = i64::try_from(base.chars().count() + 1).unwrap_or(i64::MAX);
    let removed = conn.execute(
        "DELETE FROM files
         WHERE path = ?1 OR substr(path, 1, ?2) = ?3 OR substr(path, 1, ?2) = ?4",
        params![base, len, with_slash, with_backslash],
    )?;
    Ok(removed)
}

fn candidate_from_row(row: &Row<'_>) -> rusqlite::Result<Candidate> {
    Ok(Candidate {
        id: row.get(0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        size: size_from_sql(row.get(2)?),
        mtime: row.get(3)?,
        partial_hash: row.get(4)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        size: size_from_sql(row.get(2)?),
        mtime: row.get(3)?,
        partial_hash: row.get(4)?,
        full_hash: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
    Ok(HistoryRecord {
        id: row.get(0)?,
        original_path: PathBuf::from(row.get::<_, String>(1)?),
        moved_path: PathBuf::from(row.get::<_, String>(2)?),
        timestamp: row.get(3)?,
    })
}

/// Paths are stored as text; non-UTF-8 components are replaced lossily.
fn path_to_sql(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn size_to_sql(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

fn size_from_sql(size: i64) -> u64 {
    u64::try_from(size).unwrap_or(0)
}

fn count_to_sql(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn count_from_sql(count: i64) -> usize {
    usize::try_from(count).unwrap_or(0)
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '!' | '%' | '_') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped
}
