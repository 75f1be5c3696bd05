//! Dice and Random Number Generation
//!
//! Uses Xorshift128+ algorithm for fast, high-quality, deterministic randomness.
//! Given the same seed, the worker rolls the same sequence of dice.

use std::collections::VecDeque;

use serde::{Serialize, Deserialize};

/// Source of dice rolls consumed by the execution engine.
///
/// Only the world worker's call stack ever rolls, so implementations need
/// no synchronization.
pub trait Dice {
    /// Roll `count` dice with `sides` faces each and return the sum.
    ///
    /// Each die lands in `1..=sides`. A zero `count` or `sides` yields 0.
    fn roll(&mut self, count: u32, sides: u32) -> i32;
}

/// Deterministic PRNG using Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use gridhold::core::rng::{Dice, DeterministicRng};
///
/// let mut rng = DeterministicRng::new(12345);
/// let d20 = rng.roll(1, 20);
/// assert!((1..=20).contains(&d20));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Seeded generator. The seed is spread over both state words with
    /// SplitMix64, so small sequential seeds are fine.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // xorshift never leaves the all-zero state
        if state0 | state1 == 0 {
            return Self { state: [1, 1] };
        }
        Self { state: [state0, state1] }
    }

    /// Seed from the wall clock, for servers started without a fixed seed.
    pub fn from_entropy() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self::new(nanos as u64)
    }

    /// Raw 64-bit output.
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// One die face in `1..=sides`. `sides` must be non-zero.
    fn face(&mut self, sides: u32) -> i64 {
        // modulo bias is below 2^-32 for any u32 face count
        1 + (self.next_u64() % u64::from(sides)) as i64
    }
}

impl Dice for DeterministicRng {
    /// Totals beyond `i32::MAX` saturate.
    fn roll(&mut self, count: u32, sides: u32) -> i32 {
        if sides == 0 {
            return 0;
        }
        let total = (0..count).fold(0i64, |acc, _| acc.saturating_add(self.face(sides)));
        i32::try_from(total).unwrap_or(i32::MAX)
    }
}

/// Dice that replay a fixed script of roll totals.
///
/// Each call to [`Dice::roll`] pops the next queued total, whatever the
/// requested dice. An exhausted script rolls the minimum (`count`).
#[derive(Clone, Debug, Default)]
pub struct ScriptedDice {
    totals: VecDeque<i32>,
}

impl ScriptedDice {
    /// Queue the given totals in roll order.
    pub fn new(totals: impl IntoIterator<Item = i32>) -> Self {
        Self {
            totals: totals.into_iter().collect(),
        }
    }

    /// Number of queued totals not yet consumed.
    pub fn remaining(&self) -> usize {
        self.totals.len()
    }
}

impl Dice for ScriptedDice {
    fn roll(&mut self, count: u32, sides: u32) -> i32 {
        if sides == 0 {
            return 0;
        }
        self.totals.pop_front().unwrap_or(count as i32)
    }
}

/// SplitMix64 step.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_determinism() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_different_seeds() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(54321);

        assert_ne!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn test_roll_bounds() {
        let mut rng = DeterministicRng::new(42);

        for _ in 0..1000 {
            let d20 = rng.roll(1, 20);
            assert!((1..=20).contains(&d20));

            let three_d6 = rng.roll(3, 6);
            assert!((3..=18).contains(&three_d6));
        }
    }

    #[test]
    fn test_roll_degenerate_dice() {
        let mut rng = DeterministicRng::new(7);
        assert_eq!(rng.roll(0, 20), 0);
        assert_eq!(rng.roll(4, 0), 0);
        assert_eq!(rng.roll(5, 1), 5);
    }

    #[test]
    fn test_huge_dice_saturate() {
        let mut rng = DeterministicRng::new(11);
        for _ in 0..100 {
            let face = rng.roll(1, u32::MAX);
            assert!(face >= 1);
        }
        for _ in 0..20 {
            let total = rng.roll(4, 2_000_000_000);
            assert!((4..=i32::MAX).contains(&total));
        }
    }

    #[test]
    fn test_roll_covers_every_face() {
        let mut rng = DeterministicRng::new(99);
        let mut seen = [false; 4];
        for _ in 0..500 {
            seen[(rng.roll(1, 4) - 1) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_scripted_dice_order() {
        let mut dice = ScriptedDice::new([100, 15, 2]);
        assert_eq!(dice.roll(1, 100), 100);
        assert_eq!(dice.roll(1, 20), 15);
        assert_eq!(dice.roll(1, 4), 2);
        assert_eq!(dice.remaining(), 0);

        // Exhausted scripts fall back to the minimum roll
        assert_eq!(dice.roll(2, 6), 2);
    }

    #[test]
    fn test_seeded_rolls_repeat() {
        let rolls = |seed| {
            let mut rng = DeterministicRng::new(seed);
            (0..32).map(|_| rng.roll(1, 20)).collect::<Vec<_>>()
        };
        assert_eq!(rolls(2024), rolls(2024));
        assert_ne!(rolls(2024), rolls(2025));
    }
}
