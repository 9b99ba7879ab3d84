//! Path utilities for the sharded bitmap layout.
//!
//! ```text
//! {cache_root}/bitmaps/{aa}/{bb}/{object_key}/{part}.bitmap
//! ```

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{BitmapError, Result};

const BITMAP_DIR: &str = "bitmaps";
const BITMAP_EXT: &str = "bitmap";

/// Reject keys that would escape or alias the per-object directory.
pub fn validate_object_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0'])
        || key.contains("..");
    if bad {
        return Err(BitmapError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Get the shard path components (aa/bb) from an object key.
pub fn object_shard_path(key: &str) -> (String, String) {
    let padded = format!("{:0>4}", key);
    let mut chars = padded.chars();
    let aa: String = chars.by_ref().take(2).collect();
    let bb: String = chars.take(2).collect();
    (aa, bb)
}

/// Directory holding every part bitmap of one object.
pub fn object_bitmap_dir(cache_root: &Path, key: &str) -> Result<PathBuf> {
    validate_object_key(key)?;
    let (aa, bb) = object_shard_path(key);
    Ok(cache_root.join(BITMAP_DIR).join(aa).join(bb).join(key))
}

/// Get the full filesystem path for one part's bitmap file.
pub fn bitmap_path(cache_root: &Path, key: &str, part: u64) -> Result<PathBuf> {
    Ok(object_bitmap_dir(cache_root, key)?.join(format!("{}.{}", part, BITMAP_EXT)))
}

/// Ensure all parent directories exist for a path.
pub fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BitmapError::io(parent, e))?;
    }
    Ok(())
}

/// Write a file atomically (write to .tmp, fsync, then rename over the target).
///
/// Readers observe either the previous contents or the new contents in full.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|s| s.to_str()).unwrap_or("tmp")
    ));
    let written = File::create(&tmp_path).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(BitmapError::io(&tmp_path, e));
    }
    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        BitmapError::io(path, e)
    })?;
    sync_parent_dir(path)
}

/// Fsync the directory holding `path` so a completed rename survives power loss.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| BitmapError::io(parent, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}
