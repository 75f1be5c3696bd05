//! Movement
//!
//! A step into an occupied cell turns into an interaction with the occupant:
//! walls (and other impassible entities) are attacked, closed doors are opened.
//! Moving never consults the actor's timer.

use uuid::Uuid;

use crate::game::combat::{self, AttackKind};
use crate::game::execute::{find_actor, ExecContext, ExecuteError};
use crate::game::toggle;
use crate::network::protocol::{MoveResponse, Response};
use crate::world::entity::{Direction, PassabilityKind, Position};
use crate::world::state::World;

/// What a step into `destination` resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Melee the first impassible occupant.
    Attack(Uuid),
    /// Open the first closed door.
    Open(Uuid),
    /// The cell is free.
    Walk(Position),
}

/// Inspect the destination cell in collection order.
pub fn plan_step(world: &World, destination: Position) -> StepOutcome {
    let blocker = world
        .entities
        .at(destination)
        .find(|e| e.passability.kind == PassabilityKind::AlwaysImpassible);
    if let Some(blocker) = blocker {
        return StepOutcome::Attack(blocker.id);
    }

    let door = world
        .entities
        .at(destination)
        .find(|e| e.passability.is_closed_toggle());
    if let Some(door) = door {
        return StepOutcome::Open(door.id);
    }

    StepOutcome::Walk(destination)
}

/// Move `actor_id` one cell in `direction`, or interact with what is there.
pub(crate) fn step(
    world: &mut World,
    actor_id: Uuid,
    direction: Direction,
    ctx: &mut ExecContext<'_>,
) -> Result<Response, ExecuteError> {
    let destination = find_actor(world, actor_id)?.position.step(direction);

    match plan_step(world, destination) {
        StepOutcome::Attack(target_id) => {
            combat::attack(world, actor_id, target_id, AttackKind::Melee, ctx)
                .map(Response::MeleeAttack)
        }
        StepOutcome::Open(target_id) => {
            toggle::set_open(world, actor_id, target_id, true, ctx).map(Response::Toggle)
        }
        StepOutcome::Walk(position) => {
            if let Some(actor) = world.entities.get_mut(&actor_id) {
                actor.position = position;
            }
            Ok(Response::Move(MoveResponse {
                actor_id,
                x: position.x,
                y: position.y,
            }))
        }
    }
}
