//! Client-supplied Bloom filter over outpoints.
//!
//! A client that only wants some of its channel outputs considered sends a
//! filter built over their 36-byte encodings. Bit positions for hash function
//! `i` are `BLAKE3::derive_key("chansign v1 outpoint-filter-hash-{i}", outpoint)`,
//! first 8 bytes little-endian, modulo the filter size in bits.

use bitcoin::OutPoint;
use chansign_crypto::blake3::{self, contexts::OUTPOINT_FILTER_PREFIX};
use chansign_types::api::OutpointFilterPayload;
use chansign_types::outpoint;

use crate::{GuardError, Result};

/// Largest accepted filter, in bytes.
pub const MAX_FILTER_BYTES: usize = 36_000;

/// Largest accepted number of hash functions.
pub const MAX_HASH_FNS: u32 = 50;

/// A Bloom filter over outpoints.
///
/// False positives are possible, false negatives are not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutpointFilter {
    bit_array: Vec<u8>,
    hash_fns: u32,
}

impl OutpointFilter {
    /// An empty filter of `size_bytes` bytes using `hash_fns` hash functions.
    pub fn new(size_bytes: usize, hash_fns: u32) -> Result<Self> {
        Self::from_parts(vec![0u8; size_bytes], hash_fns)
    }

    /// Load a filter from raw bits.
    pub fn from_parts(bit_array: Vec<u8>, hash_fns: u32) -> Result<Self> {
        if bit_array.is_empty() || bit_array.len() > MAX_FILTER_BYTES {
            return Err(GuardError::InvalidFilter(format!(
                "filter size {} outside 1..={MAX_FILTER_BYTES} bytes",
                bit_array.len()
            )));
        }
        if hash_fns == 0 || hash_fns > MAX_HASH_FNS {
            return Err(GuardError::InvalidFilter(format!(
                "hash function count {hash_fns} outside 1..={MAX_HASH_FNS}"
            )));
        }
        Ok(Self { bit_array, hash_fns })
    }

    /// Load a filter from its wire form.
    pub fn from_payload(payload: &OutpointFilterPayload) -> Result<Self> {
        Self::from_parts(payload.bits.clone(), payload.hash_fns)
    }

    /// Wire form of this filter.
    pub fn to_payload(&self) -> OutpointFilterPayload {
        OutpointFilterPayload {
            bits: self.bit_array.clone(),
            hash_fns: self.hash_fns,
        }
    }

    pub fn insert(&mut self, outpoint: &OutPoint) {
        for pos in self.hash_positions(outpoint) {
            self.bit_array[pos / 8] |= 1 << (pos % 8);
        }
    }

    /// Whether `outpoint` may have been inserted.
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.hash_positions(outpoint)
            .into_iter()
            .all(|pos| (self.bit_array[pos / 8] >> (pos % 8)) & 1 == 1)
    }

    pub fn hash_fns(&self) -> u32 {
        self.hash_fns
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bit_array
    }

    /// Estimated false positive rate after `count` insertions.
    pub fn false_positive_rate(&self, count: usize) -> f64 {
        let k = f64::from(self.hash_fns);
        let m = (self.bit_array.len() * 8) as f64;
        let n = count as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }

    fn hash_positions(&self, outpoint: &OutPoint) -> Vec<usize> {
        let encoded = outpoint::encode(outpoint);
        let bits = self.bit_array.len() * 8;
        (0..self.hash_fns)
            .map(|i| {
                let context = format!("{OUTPOINT_FILTER_PREFIX}{i}");
                let hash = blake3::derive_key(&context, &encoded);
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&hash[..8]);
                (u64::from_le_bytes(buf) % bits as u64) as usize
            })
            .collect()
    }
}
