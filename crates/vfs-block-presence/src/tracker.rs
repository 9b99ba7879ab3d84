//! In-memory block presence with on-demand bitmap persistence.
//!
//! State is a two-level map: object key -> part index -> bitmap. Each level
//! is behind its own `RwLock`, held only long enough to find or insert a
//! slot, and every part bitmap has its own `Mutex`. Marks on different
//! `(object_key, part)` pairs therefore never wait on each other, while
//! `flush` and `load` hold the part mutex across the whole encode+write or
//! read+replace so they cannot interleave with a mark on the same part.

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::bitmap::{BlockBitmap, MAX_BLOCKS};
use crate::error::{BitmapError, Result};
use crate::geometry::BlockGeometry;
use crate::metrics::PresenceMetrics;
use crate::paths::{atomic_write, bitmap_path, object_bitmap_dir};

type PartSlot = Arc<Mutex<BlockBitmap>>;

#[derive(Default)]
struct ObjectParts {
    parts: RwLock<BTreeMap<u64, PartSlot>>,
}

impl ObjectParts {
    fn part(&self, part: u64) -> PartSlot {
        if let Some(slot) = self.parts.read().get(&part) {
            return Arc::clone(slot);
        }
        Arc::clone(self.parts.write().entry(part).or_default())
    }

    fn existing(&self, part: u64) -> Option<PartSlot> {
        self.parts.read().get(&part).cloned()
    }

    fn slots(&self) -> Vec<(u64, PartSlot)> {
        self.parts
            .read()
            .iter()
            .map(|(part, slot)| (*part, Arc::clone(slot)))
            .collect()
    }
}

/// Tracks which blocks of which parts have been materialized locally.
pub struct BlockPresenceTracker {
    cache_root: Arc<Path>,
    objects: RwLock<HashMap<String, Arc<ObjectParts>>>,
    metrics: PresenceMetrics,
}

impl BlockPresenceTracker {
    /// Create a tracker persisting under `cache_root`. Nothing is read from
    /// disk until `load` is called.
    pub fn new<P: AsRef<Path>>(cache_root: P) -> Self {
        Self {
            cache_root: Arc::from(cache_root.as_ref()),
            objects: RwLock::new(HashMap::new()),
            metrics: PresenceMetrics::default(),
        }
    }

    /// Get the cache root path.
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn metrics(&self) -> &PresenceMetrics {
        &self.metrics
    }

    fn object(&self, key: &str) -> Arc<ObjectParts> {
        if let Some(object) = self.objects.read().get(key) {
            return Arc::clone(object);
        }
        Arc::clone(self.objects.write().entry(key.to_string()).or_default())
    }

    fn existing_part(&self, key: &str, part: u64) -> Option<PartSlot> {
        self.objects.read().get(key)?.existing(part)
    }

    /// Record that `block` of `part` is present for `key`.
    ///
    /// Purely in memory; call `flush` to persist. Blocks at or past
    /// `MAX_BLOCKS` are dropped with a warning.
    pub fn mark_block_present(&self, key: &str, part: u64, block: u64) {
        if block >= MAX_BLOCKS {
            warn!(object_key = %key, part, block, "block index out of range, ignored");
            return;
        }
        let slot = self.object(key).part(part);
        if slot.lock().set(block) {
            self.metrics.record_block_marked();
        }
    }

    /// Mark every block covering `[offset, offset + len)` present.
    pub fn mark_range_present(
        &self,
        key: &str,
        geometry: &BlockGeometry,
        offset: u64,
        len: u64,
    ) {
        for addr in geometry.blocks_in_range(offset, len) {
            self.mark_block_present(key, addr.part, addr.block);
        }
    }

    pub fn is_block_present(&self, key: &str, part: u64, block: u64) -> bool {
        self.existing_part(key, part)
            .map(|slot| slot.lock().get(block))
            .unwrap_or(false)
    }

    /// True when every block covering the range is present. An empty range
    /// is trivially present.
    pub fn is_range_present(
        &self,
        key: &str,
        geometry: &BlockGeometry,
        offset: u64,
        len: u64,
    ) -> bool {
        geometry
            .blocks_in_range(offset, len)
            .into_iter()
            .all(|addr| self.is_block_present(key, addr.part, addr.block))
    }

    /// Present block indices of one part, ascending.
    pub fn present_blocks(&self, key: &str, part: u64) -> Vec<u64> {
        self.existing_part(key, part)
            .map(|slot| slot.lock().iter_present().collect())
            .unwrap_or_default()
    }

    /// Copy of one part's bitmap, if any state is held for it.
    pub fn part_bitmap(&self, key: &str, part: u64) -> Option<BlockBitmap> {
        self.existing_part(key, part).map(|slot| slot.lock().clone())
    }

    /// Part indices currently held in memory for `key`.
    pub fn tracked_parts(&self, key: &str) -> Vec<u64> {
        self.objects
            .read()
            .get(key)
            .map(|object| object.slots().into_iter().map(|(part, _)| part).collect())
            .unwrap_or_default()
    }

    pub fn tracked_keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Persist every non-empty part of `key` to its bitmap file.
    ///
    /// Every part is attempted even after a failure; the first error is
    /// returned. Parts written before or after the failing one stay written,
    /// and calling `flush` again rewrites all of them.
    pub fn flush(&self, key: &str) -> Result<()> {
        let Some(object) = self.objects.read().get(key).cloned() else {
            debug!(object_key = %key, "flush: nothing tracked");
            return Ok(());
        };
        self.metrics.record_flush();

        let mut first_err = None;
        let mut written = 0usize;
        for (part, slot) in object.slots() {
            let bits = slot.lock();
            if bits.is_empty() {
                continue;
            }
            match self.write_part(key, part, &bits) {
                Ok(()) => {
                    written += 1;
                    self.metrics.record_part_written();
                }
                Err(e) => {
                    warn!(object_key = %key, part, error = %e, "failed to persist part bitmap");
                    self.metrics.record_flush_failure();
                    first_err.get_or_insert(e);
                }
            }
        }
        debug!(object_key = %key, parts = written, "flushed bitmaps");

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn write_part(&self, key: &str, part: u64, bits: &BlockBitmap) -> Result<()> {
        let path = bitmap_path(&self.cache_root, key, part)?;
        atomic_write(&path, bits.as_bytes())
    }

    /// Flush every tracked object, in parallel across objects.
    pub fn flush_all(&self) -> Result<()> {
        let keys = self.tracked_keys();
        let mut failures: Vec<BitmapError> = keys
            .par_iter()
            .filter_map(|key| self.flush(key).err())
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.swap_remove(0))
        }
    }

    /// Replace the in-memory bitmap for `(key, part)` with the persisted one.
    ///
    /// A missing file is not an error: the part simply has no blocks present.
    pub fn load(&self, key: &str, part: u64) -> Result<()> {
        let path = bitmap_path(&self.cache_root, key, part)?;
        let slot = self.object(key).part(part);
        let mut bits = slot.lock();
        match std::fs::read(&path) {
            Ok(bytes) => {
                *bits = BlockBitmap::from_bytes(&bytes);
                self.metrics.record_load(true);
                debug!(object_key = %key, part, bytes = bytes.len(), "loaded part bitmap");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                *bits = BlockBitmap::new();
                self.metrics.record_load(false);
                debug!(object_key = %key, part, "no persisted bitmap");
            }
            Err(e) => return Err(BitmapError::io(path, e)),
        }
        Ok(())
    }

    /// Drop all in-memory state for `key`. Persisted files are untouched.
    pub fn discard(&self, key: &str) -> bool {
        self.objects.write().remove(key).is_some()
    }

    /// Drop in-memory state and delete every persisted bitmap for `key`.
    pub fn purge(&self, key: &str) -> Result<()> {
        self.discard(key);
        let dir = object_bitmap_dir(&self.cache_root, key)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!(object_key = %key, "purged bitmaps");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BitmapError::io(dir, e)),
        }
    }
}
