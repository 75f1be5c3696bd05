//! World State
//!
//! The authoritative in-memory world: an ordered entity set and an item set.
//! Persisted as one JSON document, loaded once when the worker starts.

use std::path::Path;

use serde::{Serialize, Deserialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::hash::{compute_entities_hash, compute_world_hash, StateHash};
use crate::world::entity::{Entity, EntitySet};
use crate::world::item::{Item, ItemSet};

/// World model errors.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Two entities share an identifier.
    #[error("duplicate entity identifier: {0}")]
    DuplicateEntity(Uuid),

    /// Reading or writing the world file failed.
    #[error("world file I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The world document is not valid JSON for this schema.
    #[error("world file format: {0}")]
    Json(#[from] serde_json::Error),
}

/// Entities plus items.
///
/// Unknown keys anywhere in the document are an error, so a misspelled
/// field cannot load as an empty world.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct World {
    /// Positioned objects, in insertion order.
    #[serde(default, alias = "objects")]
    pub entities: EntitySet,
    /// Items referenced by equipment.
    #[serde(default)]
    pub items: ItemSet,
}

impl World {
    /// An empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity, rejecting duplicate identifiers.
    pub fn spawn(&mut self, entity: Entity) -> Result<(), WorldError> {
        self.entities.insert(entity)
    }

    /// Add or replace an item.
    pub fn add_item(&mut self, item: Item) {
        self.items.insert(item);
    }

    /// Parse a world document.
    pub fn from_json(json: &str) -> Result<Self, WorldError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render the world document.
    pub fn to_json(&self) -> Result<String, WorldError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a world file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WorldError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Write a world file, replacing any existing one.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), WorldError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// SHA-256 over entities and items, timers excluded.
    pub fn state_hash(&self) -> StateHash {
        compute_world_hash(self)
    }

    /// SHA-256 over entities only; comparable with a replayed client copy.
    pub fn entities_hash(&self) -> StateHash {
        compute_entities_hash(&self.entities)
    }
}
