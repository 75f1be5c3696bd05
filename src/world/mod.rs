//! World Model
//!
//! The authoritative state the worker mutates and clients replay into.
//!
//! ## Module Structure
//!
//! - `entity`: Entities, their components, and the ordered entity set
//! - `item`: Weapons, armor, and the item set
//! - `state`: The world container and its JSON document
//! - `generation`: Helpers for stamping out rooms

pub mod entity;
pub mod item;
pub mod state;
pub mod generation;

// Re-export key types
pub use entity::{
    Attribute, Attributes, Direction, Entity, EntitySet, Equipment, Passability,
    PassabilityKind, Position, Timer,
};
pub use item::{Armor, Damage, DamageType, Item, ItemSet};
pub use state::{World, WorldError};
