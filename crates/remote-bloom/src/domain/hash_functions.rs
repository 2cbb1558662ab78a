//! Hash functions for shared Bloom filters
//!
//! Positions must be reproducible by every process that opens a filter and
//! by every future release of this crate, so the hash family is versioned
//! and its tag is persisted with the filter metadata.
//!
//! k independent hash functions are replaced by double hashing over two
//! independent 64-bit hashes: `pos_i = (h1 + i * h2) mod m`. This keeps the
//! asymptotic false positive rate of k independent hashes (Kirsch &
//! Mitzenmacher) while hashing the element only twice.

use std::hash::Hasher;
use std::io::Cursor;

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;

/// Fixed SipHash keys for the two independent hashes
const SIP_KEYS_H1: (u64, u64) = (0x736f_6d65_7073_6575, 0x646f_7261_6e64_6f6d);
const SIP_KEYS_H2: (u64, u64) = (0x6c79_6765_6e65_7261, 0x7465_6462_7974_6573);

/// Versioned hash family used to derive element digests
///
/// Version tags are persisted. Never renumber an existing variant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashFamily {
    /// MurmurHash3 x64/128, seeds 0 and 1, lower 64 bits each
    #[default]
    Murmur3,
    /// SipHash-1-3 with two fixed key pairs
    SipHash13,
}

impl HashFamily {
    /// Tag persisted alongside the filter sizing
    pub fn version(&self) -> i64 {
        match self {
            HashFamily::Murmur3 => 1,
            HashFamily::SipHash13 => 2,
        }
    }

    pub fn from_version(version: i64) -> Option<Self> {
        match version {
            1 => Some(HashFamily::Murmur3),
            2 => Some(HashFamily::SipHash13),
            _ => None,
        }
    }

    /// Parse the names accepted in configuration
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "murmur3" => Some(HashFamily::Murmur3),
            "siphash13" | "siphash" => Some(HashFamily::SipHash13),
            _ => None,
        }
    }

    /// Compute the two independent 64-bit hashes of `element`
    pub fn digest(&self, element: &[u8]) -> ElementDigest {
        match self {
            HashFamily::Murmur3 => ElementDigest {
                h1: murmur_hash(element, 0),
                h2: murmur_hash(element, 1),
            },
            HashFamily::SipHash13 => ElementDigest {
                h1: sip_hash(element, SIP_KEYS_H1),
                h2: sip_hash(element, SIP_KEYS_H2),
            },
        }
    }
}

/// Two independent hashes of one serialized element
///
/// Recomputed on every call, never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementDigest {
    pub h1: u64,
    pub h2: u64,
}

impl ElementDigest {
    /// Derive `k` positions in `[0, m)` via double hashing
    ///
    /// A step that is a multiple of `m` would put every probe on the same
    /// position, so `h2` is bumped by one in that case.
    pub fn positions(&self, m: u64, k: u32) -> Vec<u64> {
        if m == 0 {
            return Vec::new();
        }
        let h1 = self.h1;
        let mut h2 = self.h2;
        if h2 % m == 0 {
            h2 = h2.wrapping_add(1);
        }

        (0..k as u64)
            .map(|i| h1.wrapping_add(i.wrapping_mul(h2)) % m)
            .collect()
    }
}

/// Hash an element with MurmurHash3 using a seed
pub fn murmur_hash(element: &[u8], seed: u32) -> u64 {
    let mut cursor = Cursor::new(element);

    // Reading from an in-memory cursor cannot fail
    let hash = murmur3::murmur3_x64_128(&mut cursor, seed).unwrap_or(0);
    hash as u64
}

fn sip_hash(element: &[u8], (k0, k1): (u64, u64)) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(k0, k1);
    hasher.write(element);
    hasher.finish()
}

/// Compute k hash positions for an element
pub fn compute_hash_positions(element: &[u8], m: u64, k: u32, family: HashFamily) -> Vec<u64> {
    family.digest(element).positions(m, k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_murmur3_hash_deterministic() {
        let element = b"hello";
        assert_eq!(murmur_hash(element, 0), murmur_hash(element, 0));
    }

    #[test]
    fn test_murmur3_different_seed_different_output() {
        let element = b"hello";
        assert_ne!(
            murmur_hash(element, 0),
            murmur_hash(element, 1),
            "Different seeds must produce different outputs"
        );
    }

    #[test]
    fn test_families_produce_different_digests() {
        let element = b"hello";
        assert_ne!(
            HashFamily::Murmur3.digest(element),
            HashFamily::SipHash13.digest(element)
        );
    }

    #[test]
    fn test_version_tags_are_stable() {
        assert_eq!(HashFamily::Murmur3.version(), 1);
        assert_eq!(HashFamily::SipHash13.version(), 2);
        assert_eq!(HashFamily::from_version(1), Some(HashFamily::Murmur3));
        assert_eq!(HashFamily::from_version(2), Some(HashFamily::SipHash13));
        assert_eq!(HashFamily::from_version(3), None);
    }

    #[test]
    fn test_parse_family_names() {
        assert_eq!(HashFamily::parse("murmur3"), Some(HashFamily::Murmur3));
        assert_eq!(HashFamily::parse(" SipHash13 "), Some(HashFamily::SipHash13));
        assert_eq!(HashFamily::parse("xxhash"), None);
    }

    #[test]
    fn test_degenerate_step_is_bumped() {
        // h2 is a multiple of m: without the bump all probes hit h1 % m
        let digest = ElementDigest { h1: 5, h2: 100 };
        let positions = digest.positions(10, 4);

        assert_eq!(positions, vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_positions_follow_double_hashing() {
        let digest = ElementDigest { h1: 3, h2: 7 };
        assert_eq!(digest.positions(100, 4), vec![3, 10, 17, 24]);
    }

    #[test]
    fn test_positions_wrap_around_u64() {
        let digest = ElementDigest {
            h1: u64::MAX,
            h2: u64::MAX,
        };
        let positions = digest.positions(1000, 3);

        let expected: Vec<u64> = (0..3u64)
            .map(|i| u64::MAX.wrapping_add(i.wrapping_mul(u64::MAX)) % 1000)
            .collect();
        assert_eq!(positions, expected);
    }

    #[test]
    fn test_multiple_hash_positions_varied() {
        let positions = compute_hash_positions(b"test_address_0xABCD", 10_000, 7, HashFamily::Murmur3);

        assert_eq!(positions.len(), 7, "Should produce k positions");
        let unique: std::collections::HashSet<_> = positions.iter().collect();
        assert!(unique.len() >= 3, "Hash functions should produce varied positions");
    }

    #[test]
    fn test_hash_uniformity() {
        let m = 1000;
        let k = 7;
        let mut counts = vec![0usize; 10];

        for i in 0..1000 {
            let element = format!("element_{}", i);
            for pos in compute_hash_positions(element.as_bytes(), m, k, HashFamily::Murmur3) {
                counts[(pos / 100) as usize] += 1;
            }
        }

        // Each bucket should have roughly 1000*7/10 = 700 entries
        let expected = 700;
        for (i, count) in counts.iter().enumerate() {
            assert!(
                *count >= expected / 2 && *count <= expected * 3 / 2,
                "Bucket {} has {} entries, expected ~{}",
                i,
                count,
                expected
            );
        }
    }

    proptest! {
        #[test]
        fn prop_positions_in_range_and_stable(
            element in proptest::collection::vec(any::<u8>(), 1..64),
            m in 1u64..1_000_000,
            k in 1u32..32,
        ) {
            for family in [HashFamily::Murmur3, HashFamily::SipHash13] {
                let first = compute_hash_positions(&element, m, k, family);
                let second = compute_hash_positions(&element, m, k, family);
                prop_assert_eq!(first.len(), k as usize);
                prop_assert!(first.iter().all(|&p| p < m));
                prop_assert_eq!(first, second);
            }
        }
    }
}
