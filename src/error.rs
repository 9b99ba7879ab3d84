//! Errors surfaced by the cache core facade.

use std::path::PathBuf;
use vfs_block_presence::BitmapError;
use vfs_cache_catalog::CatalogError;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Bitmap(#[from] BitmapError),

    /// Eviction was refused because local edits have not been written back.
    #[error("{0} is dirty and must be written back before eviction")]
    DirtyEntry(String),

    #[error("invalid cache configuration: {0}")]
    Config(String),

    #[error("cannot prepare cache root {path}: {source}")]
    CacheRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    /// Soft failures leave the cache usable; everything else should fail the
    /// filesystem operation upward.
    pub fn is_soft(&self) -> bool {
        match self {
            CacheError::Catalog(e) => e.is_soft(),
            CacheError::DirtyEntry(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
