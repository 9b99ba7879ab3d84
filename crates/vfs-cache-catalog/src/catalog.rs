//! SQLite-backed entry catalog.
//!
//! Every call opens its own connection and closes it before returning. The
//! database runs in WAL mode so readers see a consistent snapshot without
//! waiting on the writer; mutations go through one writer lock plus an
//! IMMEDIATE transaction per call.

use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{
    params, Connection, OpenFlags, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::entry::{from_nanos, to_nanos, CacheEntry};
use crate::error::{CatalogError, Result};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cache_entries (
        path             TEXT PRIMARY KEY NOT NULL,
        local_path       TEXT NOT NULL,
        size             INTEGER NOT NULL,
        origin_timestamp INTEGER NOT NULL,
        last_accessed    INTEGER NOT NULL,
        dirty            INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS cache_entries_last_accessed
        ON cache_entries (last_accessed);
";

const SELECT_COLUMNS: &str =
    "SELECT path, local_path, size, origin_timestamp, last_accessed, dirty FROM cache_entries";

const UPSERT: &str = "
    INSERT INTO cache_entries (path, local_path, size, origin_timestamp, last_accessed, dirty)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    ON CONFLICT(path) DO UPDATE SET
        local_path = excluded.local_path,
        size = excluded.size,
        origin_timestamp = excluded.origin_timestamp,
        last_accessed = excluded.last_accessed,
        dirty = excluded.dirty
";

/// Aggregate figures over the whole catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub entries: u64,
    pub dirty: u64,
    pub total_bytes: u64,
}

/// Result of `EntryCatalog::remove_if_clean`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// The entry exists but is dirty; nothing was deleted
    Dirty,
    Missing,
}

/// Durable table of `CacheEntry` rows keyed by remote path.
#[derive(Debug)]
pub struct EntryCatalog {
    db_path: PathBuf,
    busy_timeout: Duration,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl EntryCatalog {
    /// Open or create the catalog at `db_path` and ensure its schema.
    ///
    /// Any failure here is `StorageUnavailable`.
    pub fn initialize<P: AsRef<Path>>(db_path: P, busy_timeout: Duration) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| CatalogError::unavailable(&db_path, e))?;
        }

        let conn = Connection::open_with_flags(
            &db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| CatalogError::unavailable(&db_path, e))?;
        let journal_mode = conn
            .busy_timeout(busy_timeout)
            .and_then(|_| {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })
            })
            .and_then(|mode| conn.execute_batch(SCHEMA).map(|_| mode))
            .map_err(|e| CatalogError::unavailable(&db_path, e))?;

        info!(path = %db_path.display(), journal_mode = %journal_mode, "catalog initialized");
        Ok(Self {
            db_path,
            busy_timeout,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(CatalogError::StoreClosed);
        }
        Ok(())
    }

    fn connection(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    {
        let _guard = self.write_lock.lock();
        self.ensure_open()?;
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Point lookup. A missing entry is `Ok(None)`.
    pub fn get(&self, path: &str) -> Result<Option<CacheEntry>> {
        self.ensure_open()?;
        let conn = self.connection()?;
        let entry = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE path = ?1"),
                params![path],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Insert or fully replace the entry for `entry.path`.
    pub fn put(&self, entry: &CacheEntry) -> Result<()> {
        self.ensure_open()?;
        let local_path = entry
            .local_path
            .to_str()
            .ok_or_else(|| CatalogError::InvalidLocalPath(entry.local_path.clone()))?;
        let size = i64::try_from(entry.size).map_err(|_| CatalogError::SizeOutOfRange {
            path: entry.path.clone(),
            size: entry.size,
        })?;
        let origin = stored_time(&entry.path, &entry.origin_timestamp)?;
        let accessed = stored_time(&entry.path, &entry.last_accessed)?;

        self.write(|tx| {
            tx.execute(
                UPSERT,
                params![entry.path, local_path, size, origin, accessed, entry.dirty],
            )
        })?;
        debug!(path = %entry.path, size = entry.size, dirty = entry.dirty, "catalog put");
        Ok(())
    }

    /// Set `last_accessed` to exactly `when`; the last call wins.
    pub fn touch_access(&self, path: &str, when: DateTime<Utc>) -> Result<()> {
        self.ensure_open()?;
        let when = stored_time(path, &when)?;
        let updated = self.write(|tx| {
            tx.execute(
                "UPDATE cache_entries SET last_accessed = ?1 WHERE path = ?2",
                params![when, path],
            )
        })?;
        require_row(path, updated, "touch_access")
    }

    pub fn set_dirty(&self, path: &str, dirty: bool) -> Result<()> {
        let updated = self.write(|tx| {
            tx.execute(
                "UPDATE cache_entries SET dirty = ?1 WHERE path = ?2",
                params![dirty, path],
            )
        })?;
        require_row(path, updated, "set_dirty")?;
        debug!(path = %path, dirty, "catalog dirty flag");
        Ok(())
    }

    /// A local write landed: set `dirty` and `last_accessed` together.
    pub fn record_write(&self, path: &str, when: DateTime<Utc>) -> Result<()> {
        self.ensure_open()?;
        let when = stored_time(path, &when)?;
        let updated = self.write(|tx| {
            tx.execute(
                "UPDATE cache_entries SET dirty = 1, last_accessed = ?1 WHERE path = ?2",
                params![when, path],
            )
        })?;
        require_row(path, updated, "record_write")?;
        debug!(path = %path, "catalog write recorded");
        Ok(())
    }

    /// Delete the entry only while it is clean. The dirty check and the delete
    /// run in the same transaction.
    pub fn remove_if_clean(&self, path: &str) -> Result<RemoveOutcome> {
        let outcome = self.write(|tx| {
            let deleted = tx.execute(
                "DELETE FROM cache_entries WHERE path = ?1 AND dirty = 0",
                params![path],
            )?;
            if deleted > 0 {
                return Ok(RemoveOutcome::Removed);
            }
            let exists = tx
                .query_row(
                    "SELECT 1 FROM cache_entries WHERE path = ?1",
                    params![path],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            Ok(if exists {
                RemoveOutcome::Dirty
            } else {
                RemoveOutcome::Missing
            })
        })?;
        debug!(path = %path, outcome = ?outcome, "catalog remove_if_clean");
        Ok(outcome)
    }

    /// Delete the entry for `path`. Returns whether one existed.
    pub fn remove(&self, path: &str) -> Result<bool> {
        let deleted = self.write(|tx| {
            tx.execute("DELETE FROM cache_entries WHERE path = ?1", params![path])
        })?;
        debug!(path = %path, existed = deleted > 0, "catalog remove");
        Ok(deleted > 0)
    }

    /// Every entry, from a single consistent snapshot, in no particular order.
    pub fn list_all(&self) -> Result<Vec<CacheEntry>> {
        self.query_entries(SELECT_COLUMNS, [])
    }

    /// Entries that still need write-back.
    pub fn list_dirty(&self) -> Result<Vec<CacheEntry>> {
        self.query_entries(&format!("{SELECT_COLUMNS} WHERE dirty = 1"), [])
    }

    /// Up to `limit` entries, oldest access first.
    pub fn least_recently_accessed(&self, limit: usize) -> Result<Vec<CacheEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_entries(
            &format!("{SELECT_COLUMNS} ORDER BY last_accessed ASC, path ASC LIMIT ?1"),
            params![limit],
        )
    }

    fn query_entries<P>(&self, sql: &str, params: P) -> Result<Vec<CacheEntry>>
    where
        P: rusqlite::Params,
    {
        self.ensure_open()?;
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let entries = stmt
            .query_map(params, row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        self.ensure_open()?;
        let conn = self.connection()?;
        let (entries, dirty, total_bytes) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(dirty), 0), COALESCE(SUM(size), 0) FROM cache_entries",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;
        Ok(CatalogStats {
            entries: entries.max(0) as u64,
            dirty: dirty.max(0) as u64,
            total_bytes: total_bytes.max(0) as u64,
        })
    }

    /// Wait for in-flight writes, then refuse every further operation.
    pub fn shutdown(&self) {
        let _guard = self.write_lock.lock();
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(path = %self.db_path.display(), "catalog shut down");
        }
    }

    /// Tear down: drop the table and delete the database with its WAL/SHM
    /// side files.
    pub fn destroy(self) -> Result<()> {
        self.shutdown();
        {
            let conn = self.connection()?;
            conn.execute_batch("DROP TABLE IF EXISTS cache_entries;")?;
        }
        for path in [
            self.db_path.clone(),
            side_file(&self.db_path, "-wal"),
            side_file(&self.db_path, "-shm"),
        ] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(CatalogError::unavailable(path, e)),
            }
        }
        info!(path = %self.db_path.display(), "catalog destroyed");
        Ok(())
    }
}

fn stored_time(path: &str, ts: &DateTime<Utc>) -> Result<i64> {
    to_nanos(ts).ok_or_else(|| CatalogError::TimestampOutOfRange(path.to_string()))
}

fn require_row(path: &str, updated: usize, op: &str) -> Result<()> {
    if updated == 0 {
        warn!(path = %path, op, "no catalog entry to update");
        return Err(CatalogError::NotFound(path.to_string()));
    }
    Ok(())
}

fn side_file(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    let size: i64 = row.get(2)?;
    let size = u64::try_from(size)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Integer, Box::new(e)))?;
    Ok(CacheEntry {
        path: row.get(0)?,
        local_path: PathBuf::from(row.get::<_, String>(1)?),
        size,
        origin_timestamp: from_nanos(row.get(3)?),
        last_accessed: from_nanos(row.get(4)?),
        dirty: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> EntryCatalog {
        EntryCatalog::initialize(dir.path().join("catalog.db"), DEFAULT_BUSY_TIMEOUT)
            .expect("initialize catalog")
    }

    fn ts(secs: i64, nanos: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, nanos).unwrap()
    }

    fn entry(path: &str) -> CacheEntry {
        CacheEntry {
            path: path.to_string(),
            local_path: PathBuf::from(format!("/cache{}", path)),
            size: 4096,
            origin_timestamp: ts(1_700_000_000, 5),
            last_accessed: ts(1_700_000_100, 999_999_999),
            dirty: false,
        }
    }

    #[test]
    fn test_put_and_get() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);

        let e = entry("/a.bin");
        catalog.put(&e)?;
        assert_eq!(catalog.get("/a.bin")?, Some(e));
        Ok(())
    }

    #[test]
    fn test_get_missing_is_none() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);
        assert_eq!(catalog.get("/nope")?, None);
        Ok(())
    }

    #[test]
    fn test_put_overwrites_every_field() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);
        catalog.put(&entry("/a.bin"))?;

        let replaced = CacheEntry {
            path: "/a.bin".to_string(),
            local_path: PathBuf::from("/elsewhere/a.bin"),
            size: 1,
            origin_timestamp: ts(5, 0),
            last_accessed: ts(6, 0),
            dirty: true,
        };
        catalog.put(&replaced)?;
        assert_eq!(catalog.get("/a.bin")?, Some(replaced));
        assert_eq!(catalog.list_all()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_targeted_updates_on_missing_path() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);

        let err = catalog.touch_access("/ghost", ts(1, 0)).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(ref p) if p == "/ghost"));
        assert!(err.is_soft());

        let err = catalog.set_dirty("/ghost", true).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
        assert_eq!(catalog.get("/ghost")?, None);
        Ok(())
    }

    #[test]
    fn test_touch_access_last_call_wins() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);
        catalog.put(&entry("/a.bin"))?;

        catalog.touch_access("/a.bin", ts(2_000_000_000, 1))?;
        catalog.touch_access("/a.bin", ts(2_000_000_500, 2))?;
        assert_eq!(
            catalog.get("/a.bin")?.unwrap().last_accessed,
            ts(2_000_000_500, 2)
        );

        // Out of order: the later call is what sticks
        catalog.touch_access("/a.bin", ts(2_000_000_000, 1))?;
        let got = catalog.get("/a.bin")?.unwrap();
        assert_eq!(got.last_accessed, ts(2_000_000_000, 1));
        assert_eq!(got.size, 4096);
        Ok(())
    }

    #[test]
    fn test_set_dirty_only_touches_flag() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);
        let e = entry("/a.bin");
        catalog.put(&e)?;

        catalog.set_dirty("/a.bin", true)?;
        let got = catalog.get("/a.bin")?.unwrap();
        assert!(got.dirty);
        assert_eq!(CacheEntry { dirty: false, ..got }, e);
        Ok(())
    }

    #[test]
    fn test_remove_is_idempotent() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);
        catalog.put(&entry("/a.bin"))?;

        assert!(catalog.remove("/a.bin")?);
        assert!(!catalog.remove("/a.bin")?);
        assert!(!catalog.remove("/never")?);
        assert_eq!(catalog.get("/a.bin")?, None);
        Ok(())
    }

    #[test]
    fn test_remove_if_clean_keeps_dirty_entries() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);
        catalog.put(&entry("/clean"))?;
        catalog.put(&entry("/edited"))?;
        catalog.set_dirty("/edited", true)?;

        assert_eq!(catalog.remove_if_clean("/edited")?, RemoveOutcome::Dirty);
        assert!(catalog.get("/edited")?.unwrap().dirty);

        assert_eq!(catalog.remove_if_clean("/clean")?, RemoveOutcome::Removed);
        assert_eq!(catalog.get("/clean")?, None);
        assert_eq!(catalog.remove_if_clean("/clean")?, RemoveOutcome::Missing);

        catalog.set_dirty("/edited", false)?;
        assert_eq!(catalog.remove_if_clean("/edited")?, RemoveOutcome::Removed);
        Ok(())
    }

    #[test]
    fn test_remove_if_clean_races_record_write() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);

        for round in 0..50 {
            let path = format!("/race-{round}");
            catalog.put(&entry(&path))?;
            let barrier = std::sync::Barrier::new(2);

            let (removed, written) = std::thread::scope(|s| {
                let remover = s.spawn(|| {
                    barrier.wait();
                    catalog.remove_if_clean(&path).expect("remove_if_clean")
                });
                let writer = s.spawn(|| {
                    barrier.wait();
                    catalog.record_write(&path, ts(1, 0))
                });
                (
                    remover.join().expect("remover"),
                    writer.join().expect("writer"),
                )
            });

            match removed {
                RemoveOutcome::Removed => {
                    assert!(matches!(written, Err(CatalogError::NotFound(_))));
                    assert_eq!(catalog.get(&path)?, None);
                }
                RemoveOutcome::Dirty => {
                    assert!(written.is_ok());
                    assert!(catalog.get(&path)?.unwrap().dirty);
                }
                RemoveOutcome::Missing => panic!("entry vanished in round {round}"),
            }
        }
        Ok(())
    }

    #[test]
    fn test_record_write_sets_dirty_and_access() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);
        let e = entry("/a.bin");
        catalog.put(&e)?;

        catalog.record_write("/a.bin", ts(1_900_000_000, 7))?;
        let got = catalog.get("/a.bin")?.unwrap();
        assert!(got.dirty);
        assert_eq!(got.last_accessed, ts(1_900_000_000, 7));
        assert_eq!(got.size, e.size);

        assert!(matches!(
            catalog.record_write("/ghost", ts(1, 0)),
            Err(CatalogError::NotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_list_all_has_no_duplicates_or_omissions() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);
        let paths: Vec<String> = (0..25).rev().map(|i| format!("/dir/file-{i}")).collect();
        for path in &paths {
            catalog.put(&entry(path))?;
        }
        // Re-putting an existing path must not duplicate it
        catalog.put(&entry(&paths[3]))?;

        let listed = catalog.list_all()?;
        assert_eq!(listed.len(), paths.len());
        let listed: HashSet<String> = listed.into_iter().map(|e| e.path).collect();
        assert_eq!(listed, paths.into_iter().collect::<HashSet<_>>());
        Ok(())
    }

    #[test]
    fn test_least_recently_accessed_and_dirty_scans() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);
        for (i, path) in ["/c", "/a", "/b"].iter().enumerate() {
            let mut e = entry(path);
            e.last_accessed = ts(100 - i as i64 * 10, 0);
            e.dirty = *path == "/a";
            catalog.put(&e)?;
        }

        let oldest: Vec<String> = catalog
            .least_recently_accessed(2)?
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(oldest, vec!["/b".to_string(), "/a".to_string()]);

        let dirty = catalog.list_dirty()?;
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].path, "/a");

        let stats = catalog.stats()?;
        assert_eq!(
            stats,
            CatalogStats {
                entries: 3,
                dirty: 1,
                total_bytes: 3 * 4096
            }
        );
        Ok(())
    }

    #[test]
    fn test_persists_across_reopen() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let e = entry("/keep");
        {
            let catalog = open(&temp_dir);
            catalog.put(&e)?;
            catalog.shutdown();
        }
        let catalog = open(&temp_dir);
        assert_eq!(catalog.get("/keep")?, Some(e));
        Ok(())
    }

    #[test]
    fn test_operations_fail_after_shutdown() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);
        catalog.put(&entry("/a.bin"))?;
        catalog.shutdown();

        assert!(matches!(catalog.get("/a.bin"), Err(CatalogError::StoreClosed)));
        assert!(matches!(catalog.put(&entry("/b")), Err(CatalogError::StoreClosed)));
        assert!(matches!(
            catalog.touch_access("/a.bin", ts(1, 0)),
            Err(CatalogError::StoreClosed)
        ));
        assert!(matches!(
            catalog.set_dirty("/a.bin", true),
            Err(CatalogError::StoreClosed)
        ));
        assert!(matches!(catalog.remove("/a.bin"), Err(CatalogError::StoreClosed)));
        assert!(matches!(catalog.list_all(), Err(CatalogError::StoreClosed)));
        assert!(matches!(
            catalog.remove_if_clean("/a.bin"),
            Err(CatalogError::StoreClosed)
        ));
        assert!(matches!(
            catalog.record_write("/a.bin", ts(1, 0)),
            Err(CatalogError::StoreClosed)
        ));
        Ok(())
    }

    #[test]
    fn test_closed_store_wins_over_field_validation() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);
        catalog.shutdown();

        let mut e = entry("/future");
        e.origin_timestamp = Utc.with_ymd_and_hms(3000, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(catalog.put(&e), Err(CatalogError::StoreClosed)));

        let mut e = entry("/big");
        e.size = u64::MAX;
        assert!(matches!(catalog.put(&e), Err(CatalogError::StoreClosed)));

        let far = Utc.with_ymd_and_hms(3000, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            catalog.touch_access("/a.bin", far),
            Err(CatalogError::StoreClosed)
        ));
        Ok(())
    }

    #[test]
    fn test_initialize_unavailable() -> Result<()> {
        let temp_dir = TempDir::new()?;
        // A directory cannot be opened as a database file
        let err = EntryCatalog::initialize(temp_dir.path(), DEFAULT_BUSY_TIMEOUT).unwrap_err();
        assert!(matches!(err, CatalogError::StorageUnavailable { .. }));
        Ok(())
    }

    #[test]
    fn test_out_of_range_values_rejected() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);

        let mut e = entry("/big");
        e.size = u64::MAX;
        assert!(matches!(catalog.put(&e), Err(CatalogError::SizeOutOfRange { .. })));

        let mut e = entry("/future");
        e.origin_timestamp = Utc.with_ymd_and_hms(3000, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            catalog.put(&e),
            Err(CatalogError::TimestampOutOfRange(_))
        ));
        assert_eq!(catalog.list_all()?.len(), 0);
        Ok(())
    }

    #[test]
    fn test_destroy_wipes_files() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);
        catalog.put(&entry("/a.bin"))?;
        let db_path = catalog.db_path().to_path_buf();

        catalog.destroy()?;
        assert!(!db_path.exists());
        assert!(!side_file(&db_path, "-wal").exists());

        let fresh = open(&temp_dir);
        assert!(fresh.list_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_concurrent_writers_and_readers() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let catalog = open(&temp_dir);

        std::thread::scope(|s| {
            for t in 0..4 {
                let catalog = &catalog;
                s.spawn(move || {
                    for i in 0..20 {
                        let path = format!("/t{t}/f{i}");
                        catalog.put(&entry(&path)).expect("put");
                        catalog.set_dirty(&path, i % 2 == 0).expect("set_dirty");
                        catalog.touch_access(&path, ts(i, 0)).expect("touch");
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..20 {
                    for e in catalog.list_all().expect("list_all") {
                        assert_eq!(e.size, 4096);
                    }
                }
            });
        });

        let all = catalog.list_all()?;
        assert_eq!(all.len(), 80);
        assert_eq!(catalog.stats()?.dirty, 40);
        Ok(())
    }
}
