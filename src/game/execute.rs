//! Request Execution
//!
//! Maps `(World, Request)` to a `Response`, mutating the world in place.
//! A failed request leaves the world exactly as it found it.

use thiserror::Error;
use uuid::Uuid;

use crate::core::rng::Dice;
use crate::game::{combat, movement, perception, toggle};
use crate::game::combat::AttackKind;
use crate::network::protocol::{RejectReason, Request, Response};
use crate::world::entity::Entity;
use crate::world::state::World;

/// Default cooldown applied by Open and Close, in seconds.
pub const DEFAULT_ACTION_COOLDOWN_SECS: u64 = 1;

/// Per-request outcome that rejects the request without mutating the world.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecuteError {
    /// Actor or target is absent from the world.
    #[error("{role} {id} not found")]
    NotFound {
        /// "actor" or "target".
        role: &'static str,
        /// Missing identifier.
        id: Uuid,
    },

    /// The actor's timer has not elapsed.
    #[error("actor {0} is not ready")]
    NotReady(Uuid),

    /// The request does not fit the target's capability.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

impl ExecuteError {
    /// Reason code reported to the submitting connection.
    pub fn reason(&self) -> RejectReason {
        match self {
            ExecuteError::NotFound { .. } => RejectReason::NotFound,
            ExecuteError::NotReady(_) => RejectReason::NotReady,
            ExecuteError::InvalidTarget(_) => RejectReason::InvalidTarget,
        }
    }
}

/// Everything execution needs besides the world and the request.
pub struct ExecContext<'a> {
    /// Dice source, consumed only by attacks.
    pub dice: &'a mut dyn Dice,
    /// Current unix time in seconds.
    pub now: i64,
    /// Timer delay applied by Open and Close.
    pub action_cooldown_secs: u64,
}

impl<'a> ExecContext<'a> {
    /// Context with the default cooldown.
    pub fn new(dice: &'a mut dyn Dice, now: i64) -> Self {
        Self {
            dice,
            now,
            action_cooldown_secs: DEFAULT_ACTION_COOLDOWN_SECS,
        }
    }
}

/// Apply one request to the world.
pub fn execute(
    world: &mut World,
    request: &Request,
    ctx: &mut ExecContext<'_>,
) -> Result<Response, ExecuteError> {
    match request {
        Request::Move(req) => movement::step(world, req.actor_id, req.direction, ctx),
        Request::MeleeAttack(req) => {
            combat::attack(world, req.attacker_id, req.target_id, AttackKind::Melee, ctx)
                .map(Response::MeleeAttack)
        }
        Request::RangeAttack(req) => {
            combat::attack(world, req.attacker_id, req.target_id, AttackKind::Range, ctx)
                .map(Response::RangeAttack)
        }
        Request::Open(req) => {
            toggle::set_open(world, req.actor_id, req.target_id, true, ctx).map(Response::Toggle)
        }
        Request::Close(req) => {
            toggle::set_open(world, req.actor_id, req.target_id, false, ctx).map(Response::Toggle)
        }
        Request::View(req) => perception::view(world, req.actor_id, ctx).map(Response::View),
    }
}

pub(crate) fn find_actor(world: &World, id: Uuid) -> Result<&Entity, ExecuteError> {
    world.entities.get(&id).ok_or(ExecuteError::NotFound { role: "actor", id })
}

pub(crate) fn find_target(world: &World, id: Uuid) -> Result<&Entity, ExecuteError> {
    world.entities.get(&id).ok_or(ExecuteError::NotFound { role: "target", id })
}

pub(crate) fn require_ready(actor: &Entity, now: i64) -> Result<(), ExecuteError> {
    if actor.timer.ready_at(now) {
        Ok(())
    } else {
        Err(ExecuteError::NotReady(actor.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::ScriptedDice;
    use crate::network::protocol::{CloseRequest, MeleeAttackRequest, MoveRequest, OpenRequest, ViewRequest};
    use crate::world::entity::{Direction, Passability, Position};

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_missing_actor_is_not_found_without_mutation() {
        let mut world = World::new();
        let wall = Entity::new(Position::new(0, 0), Passability::impassible(), 5);
        let wall_id = wall.id;
        world.spawn(wall).unwrap();
        let before = world.clone();

        let ghost = Uuid::new_v4();
        let requests = [
            Request::Move(MoveRequest { actor_id: ghost, direction: Direction::North }),
            Request::MeleeAttack(MeleeAttackRequest { attacker_id: ghost, target_id: wall_id }),
            Request::Open(OpenRequest { actor_id: ghost, target_id: wall_id }),
            Request::View(ViewRequest { actor_id: ghost }),
        ];

        let mut dice = ScriptedDice::new([]);
        for request in &requests {
            let mut ctx = ExecContext::new(&mut dice, NOW);
            let err = execute(&mut world, request, &mut ctx).unwrap_err();
            assert_eq!(err, ExecuteError::NotFound { role: "actor", id: ghost });
            assert_eq!(err.reason(), RejectReason::NotFound);
        }
        assert_eq!(world, before);
    }

    #[test]
    fn test_missing_target_is_not_found() {
        let mut world = World::new();
        let actor = Entity::new(Position::new(0, 0), Passability::impassible(), 5);
        let actor_id = actor.id;
        world.spawn(actor).unwrap();

        let missing = Uuid::new_v4();
        let mut dice = ScriptedDice::new([]);
        let mut ctx = ExecContext::new(&mut dice, NOW);
        let err = execute(
            &mut world,
            &Request::Close(CloseRequest { actor_id, target_id: missing }),
            &mut ctx,
        )
        .unwrap_err();

        assert_eq!(err, ExecuteError::NotFound { role: "target", id: missing });
    }

    #[test]
    fn test_not_ready_reason() {
        let id = Uuid::new_v4();
        assert_eq!(ExecuteError::NotReady(id).reason(), RejectReason::NotReady);
        assert_eq!(
            ExecuteError::InvalidTarget("x".into()).reason(),
            RejectReason::InvalidTarget
        );
    }
}
