//! Catalog error kinds.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The backing store could not be opened or its schema ensured. Fatal at
    /// mount time.
    #[error("catalog store unavailable at {path}: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The open store rejected an operation (disk full, corruption, I/O).
    #[error("catalog storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A targeted update named a path with no entry.
    #[error("no catalog entry for {0}")]
    NotFound(String),

    #[error("catalog store is closed")]
    StoreClosed,

    #[error("timestamp for {0} is outside the storable range")]
    TimestampOutOfRange(String),

    #[error("size {size} for {path} is outside the storable range")]
    SizeOutOfRange { path: String, size: u64 },

    #[error("local path {0:?} is not valid UTF-8")]
    InvalidLocalPath(PathBuf),
}

impl CatalogError {
    pub(crate) fn unavailable(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        CatalogError::StorageUnavailable {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Soft failures are reported to the caller but do not indicate a broken
    /// store.
    pub fn is_soft(&self) -> bool {
        matches!(self, CatalogError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
