//! Mapping from remote path to the object key used for presence tracking.

use sha2::{Digest, Sha256};

/// Supplies the content key under which a path's block presence is tracked.
pub trait ObjectKeyResolver: Send + Sync {
    fn object_key(&self, path: &str) -> String;
}

/// Lowercase hex SHA-256 of the path.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256KeyResolver;

impl ObjectKeyResolver for Sha256KeyResolver {
    fn object_key(&self, path: &str) -> String {
        hex::encode(Sha256::digest(path.as_bytes()))
    }
}

impl<F> ObjectKeyResolver for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn object_key(&self, path: &str) -> String {
        self(path)
    }
}
