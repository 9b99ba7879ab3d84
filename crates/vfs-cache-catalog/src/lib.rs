//! Durable catalog of cached VFS entries.
//!
//! This crate provides:
//! - `EntryCatalog`: SQLite-backed table of per-path cache metadata with
//!   upsert, targeted field updates, snapshot scans and teardown
//! - `CacheEntry`: one row of that table
//! - `CatalogError`: storage failure kinds

pub mod catalog;
pub mod entry;
pub mod error;

pub use catalog::{CatalogStats, EntryCatalog, RemoveOutcome, DEFAULT_BUSY_TIMEOUT};
pub use entry::CacheEntry;
pub use error::CatalogError;
