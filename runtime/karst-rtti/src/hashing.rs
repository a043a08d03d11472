//! FNV-64 hashing for interning keys.
//!
//! Every interning table in the runtime hashes with the 64-bit
//! Fowler-Noll-Vo function: type headers are small and hashed in full,
//! so a short multiply-xor pipeline beats a keyed SipHash, and the
//! tables never face adversarial input.

use std::hash::{BuildHasherDefault, Hasher};

/// The FNV-64 offset basis.
pub const FNV_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// The FNV-64 prime.
pub const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// A streaming FNV-64 hasher. Each byte written is folded into the
/// state by multiplying with [FNV_PRIME] and xor-ing the byte in.
pub struct FnvHasher {
    state: u64,
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self { state: FNV_BASIS }
    }
}

impl Hasher for FnvHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.state
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state = self.state.wrapping_mul(FNV_PRIME);
            self.state ^= u64::from(byte);
        }
    }
}

/// A [`std::hash::BuildHasher`] producing [FnvHasher]s.
pub type FnvBuildHasher = BuildHasherDefault<FnvHasher>;

/// A [`std::collections::HashMap`] keyed with FNV-64.
pub type FnvHashMap<K, V> = std::collections::HashMap<K, V, FnvBuildHasher>;

#[cfg(test)]
mod tests {
    use std::hash::{Hash, Hasher};

    use super::*;

    fn fnv_of(bytes: &[u8]) -> u64 {
        let mut hasher = FnvHasher::default();
        hasher.write(bytes);
        hasher.finish()
    }

    #[test]
    fn test_empty_input_is_the_basis() {
        assert_eq!(fnv_of(b""), FNV_BASIS);
    }

    #[test]
    fn test_folding_is_per_byte() {
        let mut expected = FNV_BASIS;
        for byte in *b"karst" {
            expected = expected.wrapping_mul(FNV_PRIME) ^ u64::from(byte);
        }

        assert_eq!(fnv_of(b"karst"), expected);
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut split = FnvHasher::default();
        split.write(b"ka");
        split.write(b"rst");

        assert_eq!(split.finish(), fnv_of(b"karst"));
    }

    #[test]
    fn test_distinct_inputs_disagree() {
        assert_ne!(fnv_of(b"a"), fnv_of(b"b"));
        assert_ne!(fnv_of(b"ab"), fnv_of(b"ba"));
    }

    #[test]
    fn test_hash_trait_integration() {
        let mut a = FnvHasher::default();
        let mut b = FnvHasher::default();

        (42u64, "List").hash(&mut a);
        (42u64, "List").hash(&mut b);

        assert_eq!(a.finish(), b.finish());
    }
}
