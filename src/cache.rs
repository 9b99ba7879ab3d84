//! The cache core facade used by the filesystem bridge.
//!
//! `CacheCore` owns one `EntryCatalog` and one `BlockPresenceTracker` and
//! keeps them independent: the catalog is keyed by remote path, the tracker by
//! object key, and only this layer knows how to get from one to the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use tracing::{debug, info, warn};
use vfs_block_presence::{BlockGeometry, BlockPresenceTracker, MetricsSnapshot};
use vfs_cache_catalog::{CacheEntry, CatalogError, CatalogStats, EntryCatalog, RemoveOutcome};

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::resolver::{ObjectKeyResolver, Sha256KeyResolver};

/// Outcome of a startup `reconcile` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Entries whose local file matched the recorded size
    pub verified: usize,
    /// Clean entries dropped because their local copy was missing or the
    /// wrong size; the caller should delete any leftover local file
    pub invalidated: Vec<String>,
    /// Dirty entries whose local copy no longer matches; kept, with block
    /// presence cleared, pending an integrity check by the caller
    pub dirty_unverified: Vec<String>,
    /// Entries whose local copy could not be inspected (permissions, I/O);
    /// left untouched
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreStats {
    pub catalog: CatalogStats,
    pub presence: MetricsSnapshot,
}

pub struct CacheCore {
    config: CacheConfig,
    geometry: BlockGeometry,
    catalog: EntryCatalog,
    tracker: BlockPresenceTracker,
    resolver: Box<dyn ObjectKeyResolver>,
}

impl CacheCore {
    /// Open with the default SHA-256 path resolver.
    pub fn open(config: CacheConfig) -> Result<Self> {
        Self::with_resolver(config, Sha256KeyResolver)
    }

    pub fn with_resolver<R>(config: CacheConfig, resolver: R) -> Result<Self>
    where
        R: ObjectKeyResolver + 'static,
    {
        let geometry = config
            .geometry()
            .map_err(|e| CacheError::Config(e.to_string()))?;
        std::fs::create_dir_all(&config.cache_root).map_err(|source| CacheError::CacheRoot {
            path: config.cache_root.clone(),
            source,
        })?;
        let catalog = EntryCatalog::initialize(config.catalog_path(), config.busy_timeout())?;
        let tracker = BlockPresenceTracker::new(&config.cache_root);
        info!(
            root = %config.cache_root.display(),
            part_size = geometry.part_size,
            block_size = geometry.block_size,
            "cache core opened"
        );
        Ok(Self {
            config,
            geometry,
            catalog,
            tracker,
            resolver: Box::new(resolver),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn geometry(&self) -> &BlockGeometry {
        &self.geometry
    }

    pub fn catalog(&self) -> &EntryCatalog {
        &self.catalog
    }

    pub fn tracker(&self) -> &BlockPresenceTracker {
        &self.tracker
    }

    pub fn object_key(&self, path: &str) -> String {
        self.resolver.object_key(path)
    }

    /// Record a freshly populated (or refetched) entry.
    pub fn admit(&self, entry: &CacheEntry) -> Result<()> {
        self.catalog.put(entry)?;
        Ok(())
    }

    /// Resolve `path` and bump its access time.
    pub fn lookup(&self, path: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>> {
        let Some(mut entry) = self.catalog.get(path)? else {
            return Ok(None);
        };
        match self.catalog.touch_access(path, now) {
            Ok(()) => {}
            // Removed between the read and the touch
            Err(CatalogError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        entry.last_accessed = now;
        Ok(Some(entry))
    }

    /// Mark every block covering a fetched byte range present.
    pub fn record_fetched_blocks(&self, path: &str, offset: u64, len: u64) {
        let key = self.object_key(path);
        self.tracker.mark_range_present(&key, &self.geometry, offset, len);
    }

    /// Whether a read of `[offset, offset + len)` can be served from the
    /// local copy. The range is clipped to the recorded size; bytes past the
    /// end never need fetching.
    pub fn can_serve_locally(&self, path: &str, offset: u64, len: u64) -> Result<bool> {
        let Some(entry) = self.catalog.get(path)? else {
            return Ok(false);
        };
        if offset >= entry.size {
            return Ok(true);
        }
        let len = len.min(entry.size - offset);
        let key = self.object_key(path);
        Ok(self.tracker.is_range_present(&key, &self.geometry, offset, len))
    }

    /// A local write landed: flag dirty, bump access time and treat the
    /// written blocks as present.
    pub fn mark_written(
        &self,
        path: &str,
        offset: u64,
        len: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.catalog.record_write(path, now)?;
        self.record_fetched_blocks(path, offset, len);
        Ok(())
    }

    /// The origin acknowledged the write-back.
    pub fn confirm_write_back(&self, path: &str) -> Result<()> {
        self.catalog.set_dirty(path, false)?;
        Ok(())
    }

    /// Flush the path's presence bitmaps to disk.
    pub fn persist(&self, path: &str) -> Result<()> {
        let key = self.object_key(path);
        self.tracker.flush(&key)?;
        Ok(())
    }

    /// Reload presence for every part covering the entry's recorded size.
    /// Returns the number of parts loaded.
    pub fn restore(&self, path: &str) -> Result<u64> {
        let entry = self
            .catalog
            .get(path)?
            .ok_or_else(|| CatalogError::NotFound(path.to_string()))?;
        let key = self.object_key(path);
        let parts = self.geometry.part_count(entry.size);
        for part in 0..parts {
            self.tracker.load(&key, part)?;
        }
        debug!(path = %path, parts, "restored block presence");
        Ok(parts)
    }

    /// Remove a clean entry and all of its tracking state.
    ///
    /// Dirty entries are refused. Returns whether an entry existed.
    pub fn evict(&self, path: &str) -> Result<bool> {
        match self.catalog.remove_if_clean(path)? {
            RemoveOutcome::Removed => {
                self.tracker.purge(&self.object_key(path))?;
                debug!(path = %path, "evicted");
                Ok(true)
            }
            RemoveOutcome::Dirty => {
                warn!(path = %path, "refusing to evict dirty entry");
                Err(CacheError::DirtyEntry(path.to_string()))
            }
            RemoveOutcome::Missing => Ok(false),
        }
    }

    /// Check every entry's local copy against its recorded size.
    ///
    /// Clean mismatches are invalidated so they get re-fetched. Dirty
    /// mismatches stay in the catalog with their block presence cleared and
    /// are reported for an integrity check.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        for entry in self.catalog.list_all()? {
            let actual = match std::fs::metadata(&entry.local_path) {
                Ok(meta) if meta.is_file() => Some(meta.len()),
                Ok(_) => None,
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => {
                    warn!(path = %entry.path, error = %e, "cannot stat local copy, skipping");
                    report.skipped.push(entry.path);
                    continue;
                }
            };
            if actual == Some(entry.size) {
                report.verified += 1;
                continue;
            }

            let key = self.object_key(&entry.path);
            self.tracker.purge(&key)?;
            if entry.dirty {
                warn!(
                    path = %entry.path,
                    recorded = entry.size,
                    actual = ?actual,
                    "dirty entry does not match its local copy"
                );
                report.dirty_unverified.push(entry.path);
            } else {
                warn!(
                    path = %entry.path,
                    recorded = entry.size,
                    actual = ?actual,
                    "invalidating entry with mismatched local copy"
                );
                self.catalog.remove(&entry.path)?;
                report.invalidated.push(entry.path);
            }
        }
        info!(
            verified = report.verified,
            invalidated = report.invalidated.len(),
            dirty_unverified = report.dirty_unverified.len(),
            skipped = report.skipped.len(),
            "reconcile complete"
        );
        Ok(report)
    }

    pub fn stats(&self) -> Result<CoreStats> {
        Ok(CoreStats {
            catalog: self.catalog.stats()?,
            presence: self.tracker.metrics().snapshot(),
        })
    }

    /// Flush all presence state, then close the catalog. The catalog is
    /// closed even when the flush fails.
    pub fn shutdown(&self) -> Result<()> {
        let flushed = self.tracker.flush_all();
        self.catalog.shutdown();
        flushed?;
        info!("cache core shut down");
        Ok(())
    }

    /// Unmount teardown: wipe the catalog and every persisted bitmap.
    pub fn destroy(self) -> Result<()> {
        let bitmaps = self.config.cache_root.join("bitmaps");
        self.catalog.destroy()?;
        match std::fs::remove_dir_all(&bitmaps) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::CacheRoot {
                path: bitmaps,
                source,
            }),
        }
    }
}
