//! Deterministic per-tree seed derivation.
//!
//! A single root generator, seeded from the dataset seed, yields one seed per
//! tree in ascending index order. The seeds depend only on the dataset seed,
//! the tree count, and the generator kind, never on how the trees are later
//! scheduled.

use std::fmt;
use std::str::FromStr;

use rand::{RngCore, SeedableRng};
use rand_chacha::{ChaCha8Rng, ChaCha12Rng, ChaCha20Rng};
use tracing::debug;

use crate::error::ForestError;

/// Offset added to the dataset seed before seeding the root generator.
pub const ROOT_SEED_ADD: u64 = 0x0262_44fd_935c_5111;

/// Offset added to every value drawn from the root generator.
pub const TREE_SEED_INIT: u64 = 0x1321_e74a_0192_470c;

/// Pseudo-random generator algorithm used for seed derivation and row sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum RngKind {
    /// ChaCha with 8 rounds.
    #[default]
    ChaCha8,
    /// ChaCha with 12 rounds.
    ChaCha12,
    /// ChaCha with 20 rounds.
    ChaCha20,
}

impl RngKind {
    /// Build a generator of this kind from a 64-bit seed.
    #[must_use]
    pub fn generator(self, seed: u64) -> SeededRng {
        match self {
            RngKind::ChaCha8 => SeededRng::ChaCha8(ChaCha8Rng::seed_from_u64(seed)),
            RngKind::ChaCha12 => SeededRng::ChaCha12(ChaCha12Rng::seed_from_u64(seed)),
            RngKind::ChaCha20 => SeededRng::ChaCha20(ChaCha20Rng::seed_from_u64(seed)),
        }
    }
}

impl FromStr for RngKind {
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chacha8" => Ok(RngKind::ChaCha8),
            "chacha12" => Ok(RngKind::ChaCha12),
            "chacha20" => Ok(RngKind::ChaCha20),
            _ => Err(ForestError::UnknownRngKind {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for RngKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RngKind::ChaCha8 => "chacha8",
            RngKind::ChaCha12 => "chacha12",
            RngKind::ChaCha20 => "chacha20",
        };
        f.write_str(name)
    }
}

/// A seeded generator of the configured [`RngKind`].
#[derive(Debug, Clone)]
pub enum SeededRng {
    /// ChaCha8 stream.
    ChaCha8(ChaCha8Rng),
    /// ChaCha12 stream.
    ChaCha12(ChaCha12Rng),
    /// ChaCha20 stream.
    ChaCha20(ChaCha20Rng),
}

impl RngCore for SeededRng {
    fn next_u32(&mut self) -> u32 {
        match self {
            SeededRng::ChaCha8(r) => r.next_u32(),
            SeededRng::ChaCha12(r) => r.next_u32(),
            SeededRng::ChaCha20(r) => r.next_u32(),
        }
    }

    fn next_u64(&mut self) -> u64 {
        match self {
            SeededRng::ChaCha8(r) => r.next_u64(),
            SeededRng::ChaCha12(r) => r.next_u64(),
            SeededRng::ChaCha20(r) => r.next_u64(),
        }
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        match self {
            SeededRng::ChaCha8(r) => r.fill_bytes(dest),
            SeededRng::ChaCha12(r) => r.fill_bytes(dest),
            SeededRng::ChaCha20(r) => r.fill_bytes(dest),
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        match self {
            SeededRng::ChaCha8(r) => r.try_fill_bytes(dest),
            SeededRng::ChaCha12(r) => r.try_fill_bytes(dest),
            SeededRng::ChaCha20(r) => r.try_fill_bytes(dest),
        }
    }
}

/// Root generator that hands out tree seeds in ascending index order.
#[derive(Debug, Clone)]
pub struct SeedSequence {
    root: SeededRng,
    next_index: usize,
}

impl SeedSequence {
    /// Seed the root generator with `dataset_seed + ROOT_SEED_ADD`.
    #[must_use]
    pub fn new(dataset_seed: u64, kind: RngKind) -> Self {
        Self {
            root: kind.generator(dataset_seed.wrapping_add(ROOT_SEED_ADD)),
            next_index: 0,
        }
    }

    /// Index of the tree that the next call to [`SeedSequence::next_seed`] serves.
    #[must_use]
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Draw the seed for the next tree index.
    pub fn next_seed(&mut self) -> u64 {
        self.next_index += 1;
        self.root.next_u64().wrapping_add(TREE_SEED_INIT)
    }

    /// Draw seeds for `n_trees` trees, indices `0..n_trees`.
    pub fn take_seeds(&mut self, n_trees: usize) -> Vec<u64> {
        (0..n_trees).map(|_| self.next_seed()).collect()
    }
}

/// Derive one seed per tree index for a dataset seed and tree count.
#[must_use]
pub fn derive_tree_seeds(dataset_seed: u64, n_trees: usize, kind: RngKind) -> Vec<u64> {
    let seeds = SeedSequence::new(dataset_seed, kind).take_seeds(n_trees);
    debug!(dataset_seed, n_trees, rng = %kind, "derived tree seeds");
    seeds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_same_seeds() {
        let a = derive_tree_seeds(7, 25, RngKind::ChaCha8);
        let b = derive_tree_seeds(7, 25, RngKind::ChaCha8);
        assert_eq!(a, b);
        assert_eq!(a.len(), 25);
    }

    #[test]
    fn prefix_is_stable_across_tree_counts() {
        let short = derive_tree_seeds(99, 5, RngKind::ChaCha8);
        let long = derive_tree_seeds(99, 20, RngKind::ChaCha8);
        assert_eq!(short[..], long[..5]);
    }

    #[test]
    fn zero_trees_no_seeds() {
        assert!(derive_tree_seeds(1, 0, RngKind::ChaCha20).is_empty());
    }

    #[test]
    fn seeds_follow_root_generator_plus_offset() {
        let mut root = ChaCha8Rng::seed_from_u64(5u64.wrapping_add(ROOT_SEED_ADD));
        let expected: Vec<u64> = (0..3)
            .map(|_| root.next_u64().wrapping_add(TREE_SEED_INIT))
            .collect();
        assert_eq!(derive_tree_seeds(5, 3, RngKind::ChaCha8), expected);
    }

    #[test]
    fn different_dataset_seeds_differ() {
        assert_ne!(
            derive_tree_seeds(1, 4, RngKind::ChaCha8),
            derive_tree_seeds(2, 4, RngKind::ChaCha8)
        );
    }

    #[test]
    fn rng_kind_changes_stream() {
        assert_ne!(
            derive_tree_seeds(3, 4, RngKind::ChaCha8),
            derive_tree_seeds(3, 4, RngKind::ChaCha20)
        );
    }

    #[test]
    fn sequence_tracks_next_index() {
        let mut seq = SeedSequence::new(0, RngKind::ChaCha12);
        assert_eq!(seq.next_index(), 0);
        seq.next_seed();
        seq.next_seed();
        assert_eq!(seq.next_index(), 2);
    }

    #[test]
    fn rng_kind_parses_case_insensitively() {
        assert_eq!("ChaCha20".parse::<RngKind>().unwrap(), RngKind::ChaCha20);
        assert_eq!(RngKind::ChaCha12.to_string(), "chacha12");
        assert!(matches!(
            "mersenne".parse::<RngKind>(),
            Err(ForestError::UnknownRngKind { .. })
        ));
    }

    #[test]
    fn wrapping_seed_does_not_panic() {
        let seeds = derive_tree_seeds(u64::MAX, 3, RngKind::ChaCha8);
        assert_eq!(seeds.len(), 3);
    }
}
