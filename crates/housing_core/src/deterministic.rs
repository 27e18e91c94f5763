//! Deterministic utilities for reproducible splits and training
//!
//! Provides an LCG-based RNG, seed mixing for independent streams, and
//! tie-breaking so that the same seed yields identical partitions and
//! models across platforms and runs.

use std::num::Wrapping;

/// Linear Congruential Generator for deterministic pseudo-randomness
/// Uses constants from Numerical Recipes (glibc)
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: Wrapping<i64>,
}

impl LcgRng {
    // LCG constants (compatible with glibc)
    const MULTIPLIER: i64 = 1103515245;
    const INCREMENT: i64 = 12345;
    const MODULUS: i64 = 1 << 31;

    pub fn new(seed: i64) -> Self {
        Self {
            state: Wrapping(seed.wrapping_abs() % Self::MODULUS),
        }
    }

    /// Generate next random i64 in range [0, MODULUS)
    pub fn next_i64(&mut self) -> i64 {
        self.state = self.state * Wrapping(Self::MULTIPLIER) + Wrapping(Self::INCREMENT);
        self.state.0 & (Self::MODULUS - 1)
    }

    /// Uniform index in [0, bound). Uses the high bits of the draw, the low
    /// bits of an LCG have short periods.
    pub fn next_index(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        let r = self.next_i64() as u128;
        ((r * bound as u128) >> 31) as usize
    }

    /// Uniform float in [0.0, 1.0)
    pub fn next_unit(&mut self) -> f64 {
        self.next_i64() as f64 / Self::MODULUS as f64
    }

    /// Fisher-Yates shuffle
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_index(i + 1);
            items.swap(i, j);
        }
    }
}

/// Derive an independent seed for stream `stream` of a base seed.
///
/// xxhash64-style avalanche in pure integer arithmetic, so per-tree seeds do
/// not depend on the order trees are fitted in.
pub fn mix_seed(seed: i64, stream: u64) -> i64 {
    const PRIME1: i64 = 0x9E3779B185EBCA87_u64 as i64;
    const PRIME2: i64 = 0xC2B2AE3D27D4EB4F_u64 as i64;
    const PRIME3: i64 = 0x165667B19E3779F9_u64 as i64;
    const PRIME5: i64 = 0x85EBCA77C2B2AE63_u64 as i64;

    let mut h = seed.wrapping_add(PRIME5);
    h = h.wrapping_add((stream as i64).wrapping_mul(PRIME3));
    h = h.rotate_left(17).wrapping_mul(PRIME2);

    h ^= h >> 33;
    h = h.wrapping_mul(PRIME1);
    h ^= h >> 29;
    h = h.wrapping_mul(PRIME2);
    h ^= h >> 32;

    h
}

/// Deterministic tie-breaker for split selection
/// Equal-gain candidates resolve to the smallest (feature_idx, position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub position: usize,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, position: usize) -> Self {
        Self {
            feature_idx,
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_determinism() {
        let mut rng1 = LcgRng::new(42);
        let mut rng2 = LcgRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_i64(), rng2.next_i64());
        }
    }

    #[test]
    fn test_next_index_range() {
        let mut rng = LcgRng::new(42);
        for _ in 0..1000 {
            let val = rng.next_index(10);
            assert!(val < 10);
        }
        assert_eq!(rng.next_index(0), 0);
    }

    #[test]
    fn test_next_unit_range() {
        let mut rng = LcgRng::new(7);
        for _ in 0..1000 {
            let val = rng.next_unit();
            assert!((0.0..1.0).contains(&val));
        }
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut items: Vec<usize> = (0..50).collect();
        LcgRng::new(42).shuffle(&mut items);

        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        assert_ne!(items, sorted);
    }

    #[test]
    fn test_negative_seed_is_usable() {
        let mut rng1 = LcgRng::new(-42);
        let mut rng2 = LcgRng::new(-42);
        assert_eq!(rng1.next_i64(), rng2.next_i64());
        assert_eq!(LcgRng::new(i64::MIN).next_index(5), LcgRng::new(i64::MIN).next_index(5));
    }

    #[test]
    fn test_mix_seed_streams_differ() {
        assert_eq!(mix_seed(42, 3), mix_seed(42, 3));
        assert_ne!(mix_seed(42, 3), mix_seed(42, 4));
        assert_ne!(mix_seed(42, 3), mix_seed(43, 3));
    }

    #[test]
    fn test_tie_breaker_ordering() {
        let t1 = SplitTieBreaker::new(0, 10);
        let t2 = SplitTieBreaker::new(0, 11);
        let t3 = SplitTieBreaker::new(1, 2);

        assert!(t1 < t2);
        assert!(t2 < t3);
    }
}
