//! Open and Close
//!
//! Both share one path that sets the target's open flag. A successful toggle
//! delays the actor's timer by the configured cooldown.

use tracing::debug;
use uuid::Uuid;

use crate::game::execute::{find_actor, find_target, require_ready, ExecContext, ExecuteError};
use crate::network::protocol::ToggleResponse;
use crate::world::entity::PassabilityKind;
use crate::world::state::World;

pub(crate) fn set_open(
    world: &mut World,
    actor_id: Uuid,
    target_id: Uuid,
    open: bool,
    ctx: &mut ExecContext<'_>,
) -> Result<ToggleResponse, ExecuteError> {
    let actor = find_actor(world, actor_id)?;
    let target = find_target(world, target_id)?;
    require_ready(actor, ctx.now)?;

    if target.passability.kind != PassabilityKind::Toggleable {
        return Err(ExecuteError::InvalidTarget(format!(
            "{target_id} cannot be {}",
            if open { "opened" } else { "closed" }
        )));
    }

    if let Some(target) = world.entities.get_mut(&target_id) {
        target.passability.is_open = open;
    }
    if let Some(actor) = world.entities.get_mut(&actor_id) {
        actor.timer.delay(ctx.now, ctx.action_cooldown_secs);
    }

    debug!(%actor_id, %target_id, open, "Toggled");

    Ok(ToggleResponse {
        actor_id,
        target_id,
        is_open: open,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::ScriptedDice;
    use crate::game::execute::execute;
    use crate::network::protocol::{CloseRequest, OpenRequest, Request, Response};
    use crate::world::entity::{Entity, Passability, Position};

    const NOW: i64 = 1_700_000_000;

    fn room(door: Passability) -> (World, Uuid, Uuid) {
        let mut world = World::new();
        let hero = Entity::new(Position::new(0, 0), Passability::impassible(), 10);
        let target = Entity::new(Position::new(1, 0), door, 10);
        let ids = (hero.id, target.id);
        world.spawn(hero).unwrap();
        world.spawn(target).unwrap();
        (world, ids.0, ids.1)
    }

    fn open(world: &mut World, actor_id: Uuid, target_id: Uuid, now: i64) -> Result<Response, ExecuteError> {
        let mut dice = ScriptedDice::new([]);
        let mut ctx = ExecContext::new(&mut dice, now);
        execute(world, &Request::Open(OpenRequest { actor_id, target_id }), &mut ctx)
    }

    #[test]
    fn test_open_then_immediately_not_ready() {
        let (mut world, hero, door) = room(Passability::toggleable(false));

        let resp = open(&mut world, hero, door, NOW).unwrap();
        assert_eq!(
            resp,
            Response::Toggle(ToggleResponse { actor_id: hero, target_id: door, is_open: true })
        );
        assert!(world.entities.get(&door).unwrap().passability.is_open);

        let before = world.clone();
        assert_eq!(open(&mut world, hero, door, NOW), Err(ExecuteError::NotReady(hero)));
        assert_eq!(world, before);

        // cooldown elapsed
        assert!(open(&mut world, hero, door, NOW + 1).is_ok());
    }

    #[test]
    fn test_close() {
        let (mut world, hero, door) = room(Passability::toggleable(true));
        let mut dice = ScriptedDice::new([]);
        let mut ctx = ExecContext::new(&mut dice, NOW);

        let resp = execute(
            &mut world,
            &Request::Close(CloseRequest { actor_id: hero, target_id: door }),
            &mut ctx,
        )
        .unwrap();

        assert!(matches!(resp, Response::Toggle(ToggleResponse { is_open: false, .. })));
        assert!(!world.entities.get(&door).unwrap().passability.is_open);
        assert_eq!(world.entities.get(&hero).unwrap().timer.next_timestamp, NOW + 1);
    }

    #[test]
    fn test_non_toggleable_is_invalid_target() {
        let (mut world, hero, wall) = room(Passability::impassible());
        let before = world.clone();

        let err = open(&mut world, hero, wall, NOW).unwrap_err();
        assert!(matches!(err, ExecuteError::InvalidTarget(_)));
        assert_eq!(world, before);
    }

    #[test]
    fn test_cooldown_is_configurable() {
        let (mut world, hero, door) = room(Passability::toggleable(false));
        let mut dice = ScriptedDice::new([]);
        let mut ctx = ExecContext {
            dice: &mut dice,
            now: NOW,
            action_cooldown_secs: 0,
        };

        let req = Request::Open(OpenRequest { actor_id: hero, target_id: door });
        execute(&mut world, &req, &mut ctx).unwrap();
        execute(&mut world, &req, &mut ctx).unwrap();
    }
}
