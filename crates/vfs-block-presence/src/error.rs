//! Errors raised by bitmap persistence.

use std::path::PathBuf;

/// Failure reading or writing a part bitmap.
///
/// Callers should treat any of these as "presence unknown" and fall back to
/// re-fetching, never as proof that a block is present.
#[derive(Debug, thiserror::Error)]
pub enum BitmapError {
    #[error("bitmap I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid object key {0:?}")]
    InvalidKey(String),
}

impl BitmapError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BitmapError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BitmapError>;
