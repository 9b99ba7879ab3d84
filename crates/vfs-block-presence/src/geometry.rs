//! Part/block arithmetic for mapping byte ranges onto presence bits.

use serde::{Deserialize, Serialize};

use crate::bitmap::MAX_BLOCKS;

pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024;

/// Fixed part and block sizes shared by every object in a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockGeometry {
    pub part_size: u64,
    pub block_size: u64,
}

/// A single block within an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockAddress {
    pub part: u64,
    pub block: u64,
}

impl Default for BlockGeometry {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl BlockGeometry {
    /// Returns `None` unless `part_size` is a non-zero multiple of a non-zero
    /// `block_size` with at most `MAX_BLOCKS` blocks per part.
    pub fn new(part_size: u64, block_size: u64) -> Option<Self> {
        let geometry = Self {
            part_size,
            block_size,
        };
        geometry.is_valid().then_some(geometry)
    }

    pub fn is_valid(&self) -> bool {
        self.block_size > 0
            && self.part_size >= self.block_size
            && self.part_size % self.block_size == 0
            && self.part_size / self.block_size <= MAX_BLOCKS
    }

    pub fn blocks_per_part(&self) -> u64 {
        self.part_size / self.block_size
    }

    pub fn locate(&self, offset: u64) -> BlockAddress {
        BlockAddress {
            part: offset / self.part_size,
            block: (offset % self.part_size) / self.block_size,
        }
    }

    /// Number of parts needed to hold an object of `size` bytes.
    pub fn part_count(&self, size: u64) -> u64 {
        size.div_ceil(self.part_size)
    }

    /// Every block touched by `[offset, offset + len)`, in order.
    pub fn blocks_in_range(&self, offset: u64, len: u64) -> Vec<BlockAddress> {
        if len == 0 {
            return Vec::new();
        }
        let first = offset / self.block_size;
        let last = offset.saturating_add(len - 1) / self.block_size;
        let per_part = self.blocks_per_part();
        (first..=last)
            .map(|global| BlockAddress {
                part: global / per_part,
                block: global % per_part,
            })
            .collect()
    }
}
