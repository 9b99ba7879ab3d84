//! Growable presence bitmap for the blocks of one part.
//!
//! On-disk encoding is the raw backing bytes: block `i` is bit `i % 8` of
//! byte `i / 8`, least-significant bit first. The file for a bitmap of `n`
//! bits is `ceil(n / 8)` bytes long. Decoding cannot recover `n` exactly, so a
//! decoded bitmap covers every bit of every byte; the extra trailing bits are
//! unset and read back as "not present".

/// Upper bound on blocks tracked per part (a 2 MiB bitmap).
pub const MAX_BLOCKS: u64 = 1 << 24;

/// Presence bits for the blocks of a single part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockBitmap {
    bytes: Vec<u8>,
    len: u64,
}

impl BlockBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a bitmap from its on-disk bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            len: bytes.len() as u64 * 8,
        }
    }

    /// Encode for persistence. Always `ceil(len / 8)` bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of tracked bits (present or not).
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mark `block` present, growing the sequence when needed.
    ///
    /// Returns `true` if the bit was previously unset. Blocks at or past
    /// `MAX_BLOCKS` are ignored and return `false`.
    pub fn set(&mut self, block: u64) -> bool {
        if block >= MAX_BLOCKS {
            return false;
        }
        if block >= self.len {
            self.len = block + 1;
            let needed = byte_len(self.len);
            if self.bytes.len() < needed {
                self.bytes.resize(needed, 0);
            }
        }
        let (byte, mask) = locate(block);
        let was_set = self.bytes[byte] & mask != 0;
        self.bytes[byte] |= mask;
        !was_set
    }

    /// Blocks past the end of the sequence are reported absent.
    pub fn get(&self, block: u64) -> bool {
        if block >= self.len {
            return false;
        }
        let (byte, mask) = locate(block);
        self.bytes[byte] & mask != 0
    }

    pub fn count_present(&self) -> u64 {
        self.bytes.iter().map(|b| u64::from(b.count_ones())).sum()
    }

    /// Indices of present blocks in ascending order.
    pub fn iter_present(&self) -> impl Iterator<Item = u64> + '_ {
        self.bytes.iter().enumerate().flat_map(|(i, byte)| {
            (0..8u64).filter_map(move |bit| {
                if byte & (1u8 << bit) != 0 {
                    Some(i as u64 * 8 + bit)
                } else {
                    None
                }
            })
        })
    }
}

fn byte_len(bits: u64) -> usize {
    bits.div_ceil(8) as usize
}

fn locate(block: u64) -> (usize, u8) {
    ((block / 8) as usize, 1u8 << (block % 8))
}
