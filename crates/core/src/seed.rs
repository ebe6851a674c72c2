//! Seed derivation for generation requests.
//!
//! Two sources exist: [`derive_seed`], a deterministic per-shot value used
//! when reproducibility matters, and [`FreshSeeds`], a random source used
//! when every click must produce a visibly different result.

use std::collections::HashMap;
use std::fmt::Display;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::types::ShotNumber;

/// Deterministic seeds fall in `[0, DETERMINISTIC_SEED_MODULUS)`.
pub const DETERMINISTIC_SEED_MODULUS: u64 = 1_000_000;

/// Fresh random seeds fall in `[0, FRESH_SEED_CEILING)`.
pub const FRESH_SEED_CEILING: u64 = 1_000_000_000;

/// Derive the reproducible seed for a shot.
///
/// The scene and shot numbers are concatenated into a key string whose
/// UTF-16 code units are summed modulo [`DETERMINISTIC_SEED_MODULUS`]. Not
/// cryptographic: the only guarantee is that the same scene and shot always
/// yield the same seed.
pub fn derive_seed(scene: impl Display, shot: &ShotNumber) -> u64 {
    let key = format!("{scene}{shot}");
    key.encode_utf16().map(u64::from).sum::<u64>() % DETERMINISTIC_SEED_MODULUS
}

/// Random seed source that never hands the same key two equal seeds in a
/// row.
///
/// The RNG is injectable so tests can replay a known sequence.
pub struct FreshSeeds {
    rng: Box<dyn RngCore + Send>,
    last_by_key: HashMap<String, u64>,
}

impl FreshSeeds {
    /// Seed source backed by an OS-seeded [`StdRng`].
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Seed source backed by a caller-provided RNG.
    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self {
            rng: Box::new(rng),
            last_by_key: HashMap::new(),
        }
    }

    /// Draw a fresh seed for `key`, re-rolling if it equals the previous
    /// seed drawn for the same key.
    pub fn next_seed(&mut self, key: &str) -> u64 {
        let previous = self.last_by_key.get(key).copied();
        let seed = loop {
            let candidate = self.rng.random_range(0..FRESH_SEED_CEILING);
            if Some(candidate) != previous {
                break candidate;
            }
        };
        self.last_by_key.insert(key.to_string(), seed);
        seed
    }
}

impl Default for FreshSeeds {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- derive_seed --

    #[test]
    fn derive_seed_sums_key_code_units() {
        // "112" -> 49 + 49 + 50
        assert_eq!(derive_seed(1, &ShotNumber::Number(12.0)), 148);
    }

    #[test]
    fn derive_seed_is_deterministic() {
        let shot = ShotNumber::from("7");
        assert_eq!(derive_seed(3, &shot), derive_seed(3, &shot));
    }

    #[test]
    fn derive_seed_treats_numeric_forms_alike() {
        assert_eq!(
            derive_seed(2, &ShotNumber::Number(5.0)),
            derive_seed(2, &ShotNumber::from("5"))
        );
    }

    #[test]
    fn derive_seed_differs_between_neighbouring_shots() {
        assert_ne!(
            derive_seed(1, &ShotNumber::Number(1.0)),
            derive_seed(1, &ShotNumber::Number(2.0))
        );
    }

    #[test]
    fn derive_seed_stays_below_modulus() {
        let long = ShotNumber::from("ช็อตยาวมาก".repeat(500).as_str());
        assert!(derive_seed("scene", &long) < DETERMINISTIC_SEED_MODULUS);
    }

    // -- FreshSeeds --

    #[test]
    fn fresh_seeds_replay_with_injected_rng() {
        let mut a = FreshSeeds::with_rng(StdRng::seed_from_u64(42));
        let mut b = FreshSeeds::with_rng(StdRng::seed_from_u64(42));
        for _ in 0..10 {
            assert_eq!(a.next_seed("shot-1"), b.next_seed("shot-1"));
        }
    }

    #[test]
    fn fresh_seeds_never_repeat_consecutively_for_a_key() {
        let mut seeds = FreshSeeds::with_rng(StdRng::seed_from_u64(7));
        let mut previous = seeds.next_seed("shot-1");
        for _ in 0..1000 {
            let next = seeds.next_seed("shot-1");
            assert_ne!(next, previous);
            assert!(next < FRESH_SEED_CEILING);
            previous = next;
        }
    }
}
