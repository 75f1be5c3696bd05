//! Core deterministic primitives.
//!
//! Dice and state hashing. Nothing here touches the network or the clock.

pub mod rng;
pub mod hash;

// Re-export core types
pub use rng::{Dice, DeterministicRng, ScriptedDice};
pub use hash::{compute_entities_hash, compute_world_hash, StateHash};
