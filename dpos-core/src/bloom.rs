//! 2048-bit logs bloom filter

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Number of bytes in a logs bloom
pub const BLOOM_SIZE: usize = 256;

/// 2048-bit bloom filter over log addresses and topics.
///
/// Each accrued item sets three bits, derived from byte pairs (0,1), (2,3)
/// and (4,5) of its Keccak256 digest taken modulo 2048.
#[derive(Clone, Copy, PartialEq, Eq, bincode::Encode)]
pub struct Bloom([u8; BLOOM_SIZE]);

impl Bloom {
    /// Empty bloom (all bits clear)
    pub fn zero() -> Self {
        Self([0u8; BLOOM_SIZE])
    }

    /// Create from a raw byte array
    pub fn new(bytes: [u8; BLOOM_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the underlying byte array
    pub fn as_bytes(&self) -> &[u8; BLOOM_SIZE] {
        &self.0
    }

    /// Fold one item into the filter
    pub fn accrue(&mut self, item: &[u8]) {
        let digest = Keccak256::digest(item);
        for pair in 0..3 {
            let index = bit_index(&digest, pair);
            self.0[BLOOM_SIZE - 1 - index / 8] |= 1 << (index % 8);
        }
    }

    /// Check whether an item may have been accrued
    pub fn contains(&self, item: &[u8]) -> bool {
        let digest = Keccak256::digest(item);
        (0..3).all(|pair| {
            let index = bit_index(&digest, pair);
            self.0[BLOOM_SIZE - 1 - index / 8] & (1 << (index % 8)) != 0
        })
    }

    /// Fold another bloom into this one
    pub fn accrue_bloom(&mut self, other: &Bloom) {
        for (byte, other_byte) in self.0.iter_mut().zip(other.0.iter()) {
            *byte |= other_byte;
        }
    }

    /// Check if no bits are set
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

fn bit_index(digest: &[u8], pair: usize) -> usize {
    let hi = digest[pair * 2] as usize;
    let lo = digest[pair * 2 + 1] as usize;
    ((hi << 8) | lo) % (BLOOM_SIZE * 8)
}

impl Default for Bloom {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Bloom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bloom(0x{})", self.to_hex())
    }
}

impl fmt::Display for Bloom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

// Serde does not derive for arrays larger than 32 elements, so the bloom is
// round-tripped through its hex form.
impl Serialize for Bloom {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Bloom {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex_str = String::deserialize(deserializer)?;
        let bytes = hex::decode(&hex_str).map_err(D::Error::custom)?;
        if bytes.len() != BLOOM_SIZE {
            return Err(D::Error::custom("bloom must be 256 bytes"));
        }
        let mut arr = [0u8; BLOOM_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bloom() {
        let bloom = Bloom::zero();
        assert!(bloom.is_zero());
        assert!(!bloom.contains(b"anything"));
    }

    #[test]
    fn test_accrue_and_contains() {
        let mut bloom = Bloom::zero();
        bloom.accrue(b"topic-a");

        assert!(!bloom.is_zero());
        assert!(bloom.contains(b"topic-a"));
        assert!(!bloom.contains(b"topic-b"));
    }

    #[test]
    fn test_accrue_bloom_union() {
        let mut a = Bloom::zero();
        a.accrue(b"one");
        let mut b = Bloom::zero();
        b.accrue(b"two");

        a.accrue_bloom(&b);
        assert!(a.contains(b"one"));
        assert!(a.contains(b"two"));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut bloom = Bloom::zero();
        bloom.accrue(b"log");

        let json = serde_json::to_string(&bloom).unwrap();
        let restored: Bloom = serde_json::from_str(&json).unwrap();
        assert_eq!(bloom, restored);
    }
}
