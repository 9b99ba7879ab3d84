//! VFS Cache Core
//!
//! Local metadata layer for a network-backed virtual filesystem cache:
//!
//! - **Entry catalog**: durable per-path records (local copy, size, origin
//!   timestamp, access time, dirty flag) in SQLite, see [`vfs_cache_catalog`]
//! - **Block presence**: per-object, per-part bitmaps of which fixed-size
//!   blocks are held locally, see [`vfs_block_presence`]
//! - **Facade**: [`CacheCore`] ties the two together for the filesystem
//!   bridge, mapping remote paths to object keys and byte ranges to blocks
//!
//! Configuration comes from [`CacheConfig`] (environment or JSON).

pub mod cache;
pub mod config;
pub mod error;
pub mod resolver;

pub use cache::{CacheCore, CoreStats, ReconcileReport};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use resolver::{ObjectKeyResolver, Sha256KeyResolver};

pub use vfs_block_presence::{BitmapError, BlockBitmap, BlockGeometry, BlockPresenceTracker};
pub use vfs_cache_catalog::{CacheEntry, CatalogError, CatalogStats, EntryCatalog, RemoveOutcome};
