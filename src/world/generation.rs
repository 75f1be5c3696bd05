//! Room Generation Helpers
//!
//! Stamp copies of a template entity into simple shapes. Every copy gets a
//! fresh identifier; everything else is cloned from the template.

use uuid::Uuid;

use crate::world::entity::{Attributes, Entity, Passability, Position};
use crate::world::state::{World, WorldError};

fn stamp(template: &Entity, x: i32, y: i32) -> Entity {
    let mut entity = template.clone();
    entity.id = Uuid::new_v4();
    entity.position = Position::new(x, y);
    entity
}

/// Hollow ring of `size` interior cells per side, origin at (0, 0).
///
/// The ring spans `0..=size + 1` on both axes and holds `4 * size + 4` entities.
pub fn square(template: &Entity, size: u32) -> Vec<Entity> {
    let size = size as i32;
    let far = size + 1;
    let mut out = Vec::with_capacity((4 * size + 4) as usize);

    for y in [0, far] {
        for x in 0..=far {
            out.push(stamp(template, x, y));
        }
    }
    for x in [0, far] {
        for y in 1..far {
            out.push(stamp(template, x, y));
        }
    }

    out
}

/// Solid `width` x `height` rectangle, origin at (0, 0), row-major.
pub fn fill(template: &Entity, height: u32, width: u32) -> Vec<Entity> {
    let mut out = Vec::with_capacity((height * width) as usize);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            out.push(stamp(template, x, y));
        }
    }
    out
}

/// Shift every entity by `(dx, dy)`.
pub fn offset(entities: Vec<Entity>, dx: i32, dy: i32) -> Vec<Entity> {
    entities
        .into_iter()
        .map(|mut e| {
            e.position.x += dx;
            e.position.y += dy;
            e
        })
        .collect()
}

/// A walled room with a closed door on its east wall and the given players
/// standing inside, one per row starting at (1, 1).
pub fn starter_world(room_size: u32, players: &[Uuid]) -> Result<World, WorldError> {
    let room_size = room_size.max(1);
    let mut world = World::new();

    let wall = Entity::new(Position::default(), Passability::impassible(), 50);
    let door_cell = Position::new(room_size as i32 + 1, (room_size as i32 + 1) / 2);

    for entity in square(&wall, room_size) {
        if entity.position != door_cell {
            world.spawn(entity)?;
        }
    }

    let door = Entity::new(door_cell, Passability::toggleable(false), 30);
    world.spawn(door)?;

    for (row, id) in players.iter().enumerate() {
        let y = 1 + (row as i32 % room_size as i32);
        let mut player = Entity::with_id(*id, Position::new(1, y), Passability::impassible(), 20);
        player.attributes = Attributes::uniform(12);
        world.spawn(player)?;
    }

    Ok(world)
}
