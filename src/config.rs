//! Cache configuration.
//!
//! Loaded from the environment or a JSON file; every field has a default so
//! a config can be as small as `{"cache_root": "/var/cache/vfs"}`.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use vfs_block_presence::geometry::{DEFAULT_BLOCK_SIZE, DEFAULT_PART_SIZE};
use vfs_block_presence::{BlockGeometry, MAX_BLOCKS};

pub const ENV_CACHE_ROOT: &str = "VFS_CACHE_ROOT";
pub const ENV_CATALOG_PATH: &str = "VFS_CACHE_CATALOG";
pub const ENV_PART_SIZE: &str = "VFS_CACHE_PART_SIZE";
pub const ENV_BLOCK_SIZE: &str = "VFS_CACHE_BLOCK_SIZE";
pub const ENV_BUSY_TIMEOUT_MS: &str = "VFS_CACHE_BUSY_TIMEOUT_MS";

const CATALOG_FILE: &str = "catalog.db";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root of all cache state (bitmaps, and the catalog unless overridden)
    pub cache_root: PathBuf,
    /// Catalog database file; defaults to `{cache_root}/catalog.db`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,
    pub part_size: u64,
    pub block_size: u64,
    /// How long a catalog call waits on a locked database
    pub busy_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(default_cache_root())
    }
}

impl CacheConfig {
    pub fn new<P: Into<PathBuf>>(cache_root: P) -> Self {
        Self {
            cache_root: cache_root.into(),
            catalog_path: None,
            part_size: DEFAULT_PART_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// Build from `VFS_CACHE_*` environment variables. Unset variables fall
    /// back to defaults; set but unparsable ones are an error.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var_os(ENV_CACHE_ROOT) {
            Some(root) => Self::new(root),
            None => Self::default(),
        };
        config.catalog_path = std::env::var_os(ENV_CATALOG_PATH).map(PathBuf::from);
        if let Some(v) = parse_env(ENV_PART_SIZE)? {
            config.part_size = v;
        }
        if let Some(v) = parse_env(ENV_BLOCK_SIZE)? {
            config.block_size = v;
        }
        if let Some(v) = parse_env(ENV_BUSY_TIMEOUT_MS)? {
            config.busy_timeout_ms = v;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read cache config {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| anyhow!("Failed to parse cache config {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.geometry()?;
        if self.cache_root.as_os_str().is_empty() {
            return Err(anyhow!("cache_root must not be empty"));
        }
        Ok(())
    }

    pub fn geometry(&self) -> Result<BlockGeometry> {
        BlockGeometry::new(self.part_size, self.block_size).ok_or_else(|| {
            anyhow!(
                "part_size {} must be a non-zero multiple of block_size {} \
                 with at most {} blocks per part",
                self.part_size,
                self.block_size,
                MAX_BLOCKS
            )
        })
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog_path
            .clone()
            .unwrap_or_else(|| self.cache_root.join(CATALOG_FILE))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("vfs-cache")
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("Invalid value {:?} for {}: {}", raw, key, e)),
        Err(_) => Ok(None),
    }
}
