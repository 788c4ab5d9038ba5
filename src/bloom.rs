//! Block-split bloom filter (SBBF).
//!
//! Cache-line-sized filter: an array of 32-byte blocks, each eight 32-bit
//! words. An insert sets exactly one bit in each word of one block; the eight
//! odd salt multipliers steer the bit positions from the low half of the
//! hash, the high half picks the block. Used at two tiers: one filter per
//! column chunk, optionally one per data page, both keyed by
//! `xxhash64(value bytes)`.

use crate::file::ChunkSource;
use crate::types::PhysicalValue;
use crate::{Result, StrataError};

/// Hard cap on a serialized filter. Deserialization rejects block counts
/// beyond this.
pub const MAXIMUM_BLOOM_FILTER_BYTES: usize = 128 * 1024 * 1024;

pub const MINIMUM_BLOOM_FILTER_BYTES: usize = 32;

const SERIAL_VERSION: u32 = 1;
const BLOCK_BYTES: usize = 32;
const HEADER_BYTES: usize = 8;

/// Odd multipliers per the published block-split reference.
const SALT: [u32; 8] = [
    0x47b6137b, 0x44974d91, 0x8824ad5b, 0xa2b7289d, 0x705495c7, 0x2df1424b, 0x9efc4947,
    0x5c6bfb31,
];

type Block = [u32; 8];

fn block_mask(hash_lo: u32) -> Block {
    let mut mask = [0u32; 8];
    for (i, m) in mask.iter_mut().enumerate() {
        *m = 1 << (hash_lo.wrapping_mul(SALT[i]) >> 27);
    }
    mask
}

#[derive(Debug, Clone)]
pub struct Sbbf {
    blocks: Vec<Block>,
}

impl Sbbf {
    /// A filter of at least `num_bytes`, rounded up to a power-of-two block
    /// count and clamped to the serialization bounds.
    pub fn new(num_bytes: usize) -> Self {
        let clamped = num_bytes.clamp(MINIMUM_BLOOM_FILTER_BYTES, MAXIMUM_BLOOM_FILTER_BYTES);
        let blocks = (clamped / BLOCK_BYTES).next_power_of_two();
        Self {
            blocks: vec![[0u32; 8]; blocks],
        }
    }

    /// Bytes needed to hold `ndv` distinct values at false-positive rate
    /// `fpp`, from the standard split-block estimate.
    pub fn optimal_num_of_bytes(ndv: u64, fpp: f64) -> usize {
        let fpp = fpp.clamp(1e-8, 0.5);
        let num_bits = -8.0 * ndv as f64 / (1.0 - fpp.powf(1.0 / 8.0)).ln();
        let num_bytes = (num_bits / 8.0).ceil() as usize;
        num_bytes.clamp(MINIMUM_BLOOM_FILTER_BYTES, MAXIMUM_BLOOM_FILTER_BYTES)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn block_index(&self, hash: u64) -> usize {
        // Top 32 bits scaled into the block range; block count is a power of
        // two but this multiply-shift works for any count.
        (((hash >> 32) * self.blocks.len() as u64) >> 32) as usize
    }

    pub fn insert_hash(&mut self, hash: u64) {
        let idx = self.block_index(hash);
        let mask = block_mask(hash as u32);
        let block = &mut self.blocks[idx];
        for i in 0..8 {
            block[i] |= mask[i];
        }
    }

    pub fn find_hash(&self, hash: u64) -> bool {
        let idx = self.block_index(hash);
        let mask = block_mask(hash as u32);
        let block = &self.blocks[idx];
        (0..8).all(|i| block[i] & mask[i] != 0)
    }

    pub fn insert<T: PhysicalValue>(&mut self, value: &T) {
        self.insert_hash(value.bloom_hash());
    }

    pub fn find<T: PhysicalValue>(&self, value: &T) -> bool {
        self.find_hash(value.bloom_hash())
    }

    pub fn serialized_len(&self) -> usize {
        HEADER_BYTES + self.blocks.len() * BLOCK_BYTES
    }

    /// `[version: u32 LE][block count: u32 LE][blocks]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_len());
        out.extend_from_slice(&SERIAL_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.blocks.len() as u32).to_le_bytes());
        for block in &self.blocks {
            for word in block {
                out.extend_from_slice(&word.to_le_bytes());
            }
        }
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_BYTES {
            return Err(StrataError::CorruptIndex(
                "bloom filter shorter than its header".into(),
            ));
        }
        let version = u32::from_le_bytes(data[0..4].try_into().unwrap());
        if version != SERIAL_VERSION {
            return Err(StrataError::CorruptIndex(format!(
                "unknown bloom filter version {version}"
            )));
        }
        let num_blocks = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;
        if num_blocks == 0
            || num_blocks > MAXIMUM_BLOOM_FILTER_BYTES / BLOCK_BYTES
            || !num_blocks.is_power_of_two()
        {
            return Err(StrataError::CorruptIndex(format!(
                "bloom filter block count {num_blocks} out of range"
            )));
        }
        let body = HEADER_BYTES + num_blocks * BLOCK_BYTES;
        if data.len() < body {
            return Err(StrataError::CorruptIndex(format!(
                "bloom filter truncated: {} of {} bytes",
                data.len(),
                body
            )));
        }
        let mut blocks = Vec::with_capacity(num_blocks);
        let mut pos = HEADER_BYTES;
        for _ in 0..num_blocks {
            let mut block = [0u32; 8];
            for word in block.iter_mut() {
                *word = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap());
                pos += 4;
            }
            blocks.push(block);
        }
        Ok(Self { blocks })
    }

    /// Ranged-read a serialized filter at `offset`. The header is read first
    /// so only the exact block payload is fetched.
    pub fn read_from(source: &dyn ChunkSource, offset: u64) -> Result<Self> {
        if offset + HEADER_BYTES as u64 > source.len() {
            return Err(StrataError::CorruptIndex(format!(
                "bloom filter offset {offset} past EOF ({})",
                source.len()
            )));
        }
        let header = source.read_at(offset, HEADER_BYTES)?;
        let num_blocks = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
        if num_blocks == 0 || num_blocks > MAXIMUM_BLOOM_FILTER_BYTES / BLOCK_BYTES {
            return Err(StrataError::CorruptIndex(format!(
                "bloom filter block count {num_blocks} out of range"
            )));
        }
        let total = HEADER_BYTES + num_blocks * BLOCK_BYTES;
        if offset + total as u64 > source.len() {
            return Err(StrataError::CorruptIndex(format!(
                "bloom filter at {offset} ({total} bytes) runs past EOF ({})",
                source.len()
            )));
        }
        let bytes = source.read_at(offset, total)?;
        Self::from_bytes(&bytes)
    }
}
