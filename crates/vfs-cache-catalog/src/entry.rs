//! Catalog record for one cached remote object.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Cache metadata for a single remote path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Remote path (primary key)
    pub path: String,
    /// Where the cached bytes live on local storage
    pub local_path: PathBuf,
    /// Byte length as last known
    pub size: u64,
    /// Version/mtime of the object at the origin
    pub origin_timestamp: DateTime<Utc>,
    /// Last read/write touch, drives eviction ordering
    pub last_accessed: DateTime<Utc>,
    /// Local content diverged from the origin and needs write-back
    pub dirty: bool,
}

impl CacheEntry {
    /// A clean entry accessed now.
    pub fn new(
        path: impl Into<String>,
        local_path: impl Into<PathBuf>,
        size: u64,
        origin_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            path: path.into(),
            local_path: local_path.into(),
            size,
            origin_timestamp,
            last_accessed: Utc::now(),
            dirty: false,
        }
    }
}

/// Timestamps are stored as Unix nanoseconds so they round-trip exactly.
pub(crate) fn to_nanos(ts: &DateTime<Utc>) -> Option<i64> {
    ts.timestamp_nanos_opt()
}

pub(crate) fn from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}
