//! View
//!
//! An actor sees a square box around itself whose half-width grows with
//! Wisdom. The box is half-open: `[x - d, x + d)` on both axes.

use uuid::Uuid;

use crate::game::execute::{find_actor, require_ready, ExecContext, ExecuteError};
use crate::network::protocol::ViewResponse;
use crate::world::entity::{Entity, Position};
use crate::world::state::World;

/// Half-width at Wisdom modifier 0.
pub const BASE_VIEW_DISTANCE: i32 = 10;

/// Axis-aligned, half-open region of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewBox {
    /// Inclusive lower x.
    pub min_x: i32,
    /// Exclusive upper x.
    pub max_x: i32,
    /// Inclusive lower y.
    pub min_y: i32,
    /// Exclusive upper y.
    pub max_y: i32,
}

impl ViewBox {
    /// Box of half-width `distance` centered on `center`.
    pub fn around(center: Position, distance: i32) -> Self {
        Self {
            min_x: center.x.saturating_sub(distance),
            max_x: center.x.saturating_add(distance),
            min_y: center.y.saturating_sub(distance),
            max_y: center.y.saturating_add(distance),
        }
    }

    /// Box an entity can see.
    pub fn for_entity(entity: &Entity) -> Self {
        Self::around(entity.position, view_distance(entity))
    }

    /// Whether `position` lies inside.
    pub fn contains(&self, position: Position) -> bool {
        (self.min_x..self.max_x).contains(&position.x)
            && (self.min_y..self.max_y).contains(&position.y)
    }
}

/// `wisdom modifier + 10`.
pub fn view_distance(entity: &Entity) -> i32 {
    entity.attributes.wisdom.modifier() + BASE_VIEW_DISTANCE
}

pub(crate) fn view(
    world: &World,
    actor_id: Uuid,
    ctx: &ExecContext<'_>,
) -> Result<ViewResponse, ExecuteError> {
    let actor = find_actor(world, actor_id)?;
    require_ready(actor, ctx.now)?;

    let region = ViewBox::for_entity(actor);
    let mut objects: Vec<Entity> = world
        .entities
        .iter()
        .filter(|e| region.contains(e.position))
        .cloned()
        .collect();
    // stable: ties keep collection order
    objects.sort_by_key(|e| (e.position.x, e.position.y));

    Ok(ViewResponse { actor_id, objects })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::ScriptedDice;
    use crate::world::entity::{Attribute, Passability};

    const NOW: i64 = 1_700_000_000;

    fn at(x: i32, y: i32) -> Entity {
        Entity::new(Position::new(x, y), Passability::passable(), 1)
    }

    fn look(world: &World, actor_id: Uuid) -> Result<ViewResponse, ExecuteError> {
        let mut dice = ScriptedDice::new([]);
        let ctx = ExecContext::new(&mut dice, NOW);
        view(world, actor_id, &ctx)
    }

    #[test]
    fn test_view_box_half_open_boundaries() {
        let mut world = World::new();
        let mut hero = at(0, 0);
        hero.attributes.wisdom = Attribute(20);
        let hero_id = hero.id;
        world.spawn(hero).unwrap();

        // wisdom 20 gives modifier 5: half-width 15
        let far = ViewBox::for_entity(world.entities.get(&hero_id).unwrap());
        assert_eq!(far, ViewBox::around(Position::new(0, 0), 15));

        world.entities.get_mut(&hero_id).unwrap().attributes.wisdom = Attribute(10);
        let low = at(-10, 0);
        let high = at(10, 0);
        let corner = at(-10, 9);
        let (low_id, high_id, corner_id) = (low.id, high.id, corner.id);
        world.spawn(high).unwrap();
        world.spawn(low).unwrap();
        world.spawn(corner).unwrap();

        let seen: Vec<Uuid> = look(&world, hero_id).unwrap().objects.iter().map(|e| e.id).collect();
        assert!(seen.contains(&low_id));
        assert!(seen.contains(&corner_id));
        assert!(!seen.contains(&high_id));
        assert!(seen.contains(&hero_id));
    }

    #[test]
    fn test_view_orders_by_x_then_y() {
        let mut world = World::new();
        let hero = at(0, 0);
        let hero_id = hero.id;
        world.spawn(at(2, 1)).unwrap();
        world.spawn(at(-1, 3)).unwrap();
        world.spawn(hero).unwrap();
        world.spawn(at(2, -4)).unwrap();

        let cells: Vec<(i32, i32)> = look(&world, hero_id)
            .unwrap()
            .objects
            .iter()
            .map(|e| (e.position.x, e.position.y))
            .collect();
        assert_eq!(cells, vec![(-1, 3), (0, 0), (2, -4), (2, 1)]);
    }

    #[test]
    fn test_view_requires_ready_timer() {
        let mut world = World::new();
        let mut hero = at(0, 0);
        hero.timer.next_timestamp = NOW + 5;
        let hero_id = hero.id;
        world.spawn(hero).unwrap();

        assert_eq!(look(&world, hero_id), Err(ExecuteError::NotReady(hero_id)));
    }

    #[test]
    fn test_negative_wisdom_still_sees_five() {
        let mut hero = at(0, 0);
        hero.attributes.wisdom = Attribute(-4);
        assert_eq!(view_distance(&hero), 5);
    }
}
