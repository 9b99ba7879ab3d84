//! Block presence tracking for partially cached objects.
//!
//! This crate provides:
//! - `BlockPresenceTracker`: sharded in-memory presence bitmaps keyed by
//!   `(object_key, part)`, flushed to one bitmap file per part
//! - `BlockBitmap`: the growable LSB-first bit sequence and its byte encoding
//! - `BlockGeometry`: part/block arithmetic for byte ranges
//! - `PresenceMetrics`: flush/load counters

pub mod bitmap;
pub mod error;
pub mod geometry;
pub mod metrics;
pub mod paths;
pub mod tracker;

pub use bitmap::{BlockBitmap, MAX_BLOCKS};
pub use error::BitmapError;
pub use geometry::{BlockAddress, BlockGeometry};
pub use metrics::{MetricsSnapshot, PresenceMetrics};
pub use tracker::BlockPresenceTracker;
