//! Entity Definitions
//!
//! Positioned, stat-bearing world objects and the ordered set that holds them.
//! Lookups are linear scans in insertion order; the first match wins ties.

use std::fmt;

use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::world::state::WorldError;

// =============================================================================
// POSITION
// =============================================================================

/// One of the four grid directions.
///
/// On the wire a direction is its index: North 0, East 1, South 2, West 3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Direction {
    /// y - 1
    North = 0,
    /// x + 1
    East = 1,
    /// y + 1
    South = 2,
    /// x - 1
    West = 3,
}

impl Direction {
    /// All directions in wire order.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Unit offset `(dx, dy)` for this direction.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Direction::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| format!("invalid direction {value}, expected 0..=3"))
    }
}

impl From<Direction> for u8 {
    fn from(direction: Direction) -> Self {
        direction as u8
    }
}

/// Integer grid coordinates. No bounds are enforced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Position {
    /// Column.
    pub x: i32,
    /// Row, growing southwards.
    pub y: i32,
}

impl Position {
    /// Create a position.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell one unit away in `direction`.
    ///
    /// Coordinates wrap at the `i32` limits.
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.offset();
        Self::new(self.x.wrapping_add(dx), self.y.wrapping_add(dy))
    }
}

// =============================================================================
// COMPONENTS
// =============================================================================

/// Next-eligible timestamp (unix seconds) for rate-limited actions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timer {
    /// Earliest unix second at which the owner may act again.
    pub next_timestamp: i64,
}

impl Timer {
    /// Ready iff `now >= next_timestamp`.
    #[inline]
    pub fn ready_at(&self, now: i64) -> bool {
        now >= self.next_timestamp
    }

    /// Push the next-eligible timestamp to `now + seconds`.
    pub fn delay(&mut self, now: i64, seconds: u64) {
        self.next_timestamp = now.saturating_add(seconds as i64);
    }
}

/// How an entity blocks movement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassabilityKind {
    /// Walls. Moving into one is an attack.
    #[default]
    AlwaysImpassible,
    /// Floors and anything that never blocks.
    AlwaysPassable,
    /// Doors. Blocks only while closed.
    Toggleable,
}

/// Passability component. `is_open` only matters for [`PassabilityKind::Toggleable`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Passability {
    /// Blocking behaviour.
    #[serde(rename = "type")]
    pub kind: PassabilityKind,
    /// Open flag for toggleables.
    #[serde(default)]
    pub is_open: bool,
}

impl Passability {
    /// A solid wall.
    pub const fn impassible() -> Self {
        Self { kind: PassabilityKind::AlwaysImpassible, is_open: false }
    }

    /// Never blocks.
    pub const fn passable() -> Self {
        Self { kind: PassabilityKind::AlwaysPassable, is_open: false }
    }

    /// A door in the given state.
    pub const fn toggleable(is_open: bool) -> Self {
        Self { kind: PassabilityKind::Toggleable, is_open }
    }

    /// True for a toggleable that is currently closed.
    pub fn is_closed_toggle(&self) -> bool {
        self.kind == PassabilityKind::Toggleable && !self.is_open
    }
}

/// A raw ability score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attribute(pub i32);

impl Attribute {
    /// `floor(0.5 * score) - 5`, or -5 for negative scores.
    ///
    /// Score 10 is the neutral 0; score 30 gives +10.
    pub fn modifier(self) -> i32 {
        if self.0 < 0 {
            return -5;
        }
        self.0 / 2 - 5
    }
}

/// The four ability scores of an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Attributes {
    /// Armor class and range damage.
    pub dexterity: Attribute,
    /// Critical chance.
    pub luck: Attribute,
    /// Attack roll and melee damage.
    pub strength: Attribute,
    /// View distance.
    pub wisdom: Attribute,
}

impl Attributes {
    /// All four scores set to the same value.
    pub const fn uniform(score: i32) -> Self {
        Self {
            dexterity: Attribute(score),
            luck: Attribute(score),
            strength: Attribute(score),
            wisdom: Attribute(score),
        }
    }
}

/// Equipped item identifiers, one per slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Equipment {
    /// Head slot.
    pub head_id: Option<Uuid>,
    /// Hands slot.
    pub hands_id: Option<Uuid>,
    /// Weapon used for attacks.
    pub primary_item_id: Option<Uuid>,
    /// Off-hand slot.
    pub secondary_item_id: Option<Uuid>,
    /// Legs slot.
    pub legs_id: Option<Uuid>,
    /// Armor consulted when this entity is hit.
    pub chest_id: Option<Uuid>,
}

// =============================================================================
// ENTITY
// =============================================================================

/// A single in-world object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entity {
    /// Unique identifier; also the topic its owner subscribes to.
    pub id: Uuid,
    /// Rate limit for Open, Close and View.
    #[serde(default)]
    pub timer: Timer,
    /// Grid cell.
    pub position: Position,
    /// Blocking behaviour.
    #[serde(default)]
    pub passability: Passability,
    /// Ability scores.
    #[serde(default)]
    pub attributes: Attributes,
    /// Equipped items.
    #[serde(default)]
    pub equipment: Equipment,
    /// Hit points. Never negative; an entity at 0 is removed from the world.
    pub health: i32,
}

impl Entity {
    /// A fresh entity with a random identifier.
    pub fn new(position: Position, passability: Passability, health: i32) -> Self {
        Self::with_id(Uuid::new_v4(), position, passability, health)
    }

    /// An entity with a known identifier and neutral attributes.
    pub fn with_id(id: Uuid, position: Position, passability: Passability, health: i32) -> Self {
        Self {
            id,
            timer: Timer::default(),
            position,
            passability,
            attributes: Attributes::uniform(10),
            equipment: Equipment::default(),
            health,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entity({}) at ({}, {}) hp {}",
            self.id, self.position.x, self.position.y, self.health
        )
    }
}

// =============================================================================
// ENTITY SET
// =============================================================================

/// Entities in insertion order with unique identifiers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Entity>", into = "Vec<Entity>")]
pub struct EntitySet {
    entities: Vec<Entity>,
}

impl EntitySet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list, rejecting duplicate identifiers.
    pub fn from_entities(entities: Vec<Entity>) -> Result<Self, WorldError> {
        let mut set = Self::new();
        for entity in entities {
            set.insert(entity)?;
        }
        Ok(set)
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    /// Look up by identifier.
    pub fn get(&self, id: &Uuid) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == *id)
    }

    /// Mutable lookup by identifier.
    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id == *id)
    }

    /// True if an entity with this identifier exists.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.get(id).is_some()
    }

    /// Every entity occupying `position`, in insertion order.
    pub fn at(&self, position: Position) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(move |e| e.position == position)
    }

    /// Append an entity. Fails if the identifier is taken.
    pub fn insert(&mut self, entity: Entity) -> Result<(), WorldError> {
        if self.contains(&entity.id) {
            return Err(WorldError::DuplicateEntity(entity.id));
        }
        self.entities.push(entity);
        Ok(())
    }

    /// Remove by identifier, preserving the order of the rest.
    pub fn remove(&mut self, id: &Uuid) -> Option<Entity> {
        let index = self.entities.iter().position(|e| e.id == *id)?;
        Some(self.entities.remove(index))
    }

    /// Drop every entity.
    pub fn clear(&mut self) {
        self.entities.clear();
    }
}

impl TryFrom<Vec<Entity>> for EntitySet {
    type Error = WorldError;

    fn try_from(entities: Vec<Entity>) -> Result<Self, Self::Error> {
        Self::from_entities(entities)
    }
}

impl From<EntitySet> for Vec<Entity> {
    fn from(set: EntitySet) -> Self {
        set.entities
    }
}

// =============================================================================
// TESTS
// =============================================================================
