//! Counters for presence tracking and bitmap I/O.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Tracker metrics (thread-safe counters, cheap to clone).
#[derive(Debug, Clone, Default)]
pub struct PresenceMetrics {
    /// Blocks that flipped from absent to present
    pub blocks_marked: Arc<AtomicU64>,
    /// Calls to `flush`
    pub flushes: Arc<AtomicU64>,
    /// Part bitmap files written
    pub parts_written: Arc<AtomicU64>,
    /// Part bitmap writes that failed
    pub flush_failures: Arc<AtomicU64>,
    /// Calls to `load`
    pub loads: Arc<AtomicU64>,
    /// Loads that found no bitmap file
    pub load_misses: Arc<AtomicU64>,
}

impl PresenceMetrics {
    pub fn record_block_marked(&self) {
        self.blocks_marked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_part_written(&self) {
        self.parts_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush_failure(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load(&self, found: bool) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        if !found {
            self.load_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_marked: self.blocks_marked.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            parts_written: self.parts_written.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_misses: self.load_misses.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics (for reporting).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub blocks_marked: u64,
    pub flushes: u64,
    pub parts_written: u64,
    pub flush_failures: u64,
    pub loads: u64,
    pub load_misses: u64,
}
