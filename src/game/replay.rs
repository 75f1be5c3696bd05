//! Response Replay
//!
//! Applies published responses to a local copy of the world without
//! rolling any dice. Every write is absolute, so applying the same
//! attack, toggle or move response twice lands on the same world.

use thiserror::Error;
use uuid::Uuid;

use crate::network::protocol::{AttackResponse, Response, ToggleResponse};
use crate::world::entity::EntitySet;
use crate::world::state::{World, WorldError};

/// Replay failures.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The response names an entity the local copy does not hold.
    #[error("entity {0} is not in the local world")]
    MissingEntity(Uuid),

    /// A view listed the same entity twice.
    #[error("invalid view: {0}")]
    InvalidView(#[from] WorldError),
}

impl Response {
    /// Mirror this response onto `world`.
    ///
    /// A wrapper applies its children in order and stops at the first failure,
    /// leaving the effects of earlier children in place.
    pub fn apply(&self, world: &mut World) -> Result<(), ReplayError> {
        match self {
            Response::MeleeAttack(r) | Response::RangeAttack(r) => apply_attack(r, world),
            Response::Toggle(r) => apply_toggle(r, world),
            Response::Move(r) => {
                let actor = world
                    .entities
                    .get_mut(&r.actor_id)
                    .ok_or(ReplayError::MissingEntity(r.actor_id))?;
                actor.position.x = r.x;
                actor.position.y = r.y;
                Ok(())
            }
            Response::View(r) => {
                world.entities = EntitySet::from_entities(r.objects.clone())?;
                Ok(())
            }
            Response::Wrapper(children) => {
                for child in children {
                    child.apply(world)?;
                }
                Ok(())
            }
        }
    }
}

fn apply_attack(r: &AttackResponse, world: &mut World) -> Result<(), ReplayError> {
    if r.health_remaining <= 0 {
        // already gone is as good as removed
        world.entities.remove(&r.target_id);
        return Ok(());
    }

    let target = world
        .entities
        .get_mut(&r.target_id)
        .ok_or(ReplayError::MissingEntity(r.target_id))?;
    target.health = r.health_remaining;
    Ok(())
}

fn apply_toggle(r: &ToggleResponse, world: &mut World) -> Result<(), ReplayError> {
    let target = world
        .entities
        .get_mut(&r.target_id)
        .ok_or(ReplayError::MissingEntity(r.target_id))?;
    target.passability.is_open = r.is_open;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::ScriptedDice;
    use crate::game::execute::{execute, ExecContext};
    use crate::network::protocol::{
        MeleeAttackRequest, MoveRequest, MoveResponse, OpenRequest, Request, ViewRequest,
        ViewResponse,
    };
    use crate::world::entity::{Direction, Entity, Passability, Position};
    use crate::world::item::{Armor, Item};

    const NOW: i64 = 1_700_000_000;

    struct Scene {
        server: World,
        hero: Uuid,
        door: Uuid,
        brute: Uuid,
    }

    fn scene() -> Scene {
        let mut server = World::new();
        let hero = Entity::new(Position::new(0, 0), Passability::impassible(), 10);
        let door = Entity::new(Position::new(1, 0), Passability::toggleable(false), 10);
        let mut brute = Entity::new(Position::new(0, 1), Passability::impassible(), 6);
        let spikes = Item::armor(Armor { melee_reduction: 4, range_reduction: 0 });
        brute.equipment.chest_id = Some(spikes.id);

        let ids = (hero.id, door.id, brute.id);
        server.add_item(spikes);
        server.spawn(hero).unwrap();
        server.spawn(door).unwrap();
        server.spawn(brute).unwrap();
        Scene { server, hero: ids.0, door: ids.1, brute: ids.2 }
    }

    fn run(world: &mut World, request: Request, rolls: Vec<i32>) -> Response {
        let mut dice = ScriptedDice::new(rolls);
        let mut ctx = ExecContext::new(&mut dice, NOW);
        execute(world, &request, &mut ctx).unwrap()
    }

    #[test]
    fn test_replay_tracks_server() {
        let Scene { mut server, hero, door, brute } = scene();
        let mut replica = server.clone();

        let responses = vec![
            run(&mut server, Request::Open(OpenRequest { actor_id: hero, target_id: door }), vec![]),
            run(
                &mut server,
                Request::MeleeAttack(MeleeAttackRequest { attacker_id: hero, target_id: brute }),
                vec![100, 15, 1],
            ),
            run(&mut server, Request::Move(MoveRequest { actor_id: hero, direction: Direction::North }), vec![]),
        ];

        for resp in &responses {
            resp.apply(&mut replica).unwrap();
        }

        // timers are not replayed; everything else matches
        let mut expected = server.clone();
        expected.entities.get_mut(&hero).unwrap().timer = replica.entities.get(&hero).unwrap().timer;
        assert_eq!(replica, expected);
        assert_eq!(replica.entities.get(&brute).unwrap().health, 3);
    }

    #[test]
    fn test_view_then_replay_matches_server_hash() {
        let Scene { mut server, hero, door, brute } = scene();
        let mut client = World::new();

        let requests = vec![
            (Request::View(ViewRequest { actor_id: hero }), vec![]),
            (Request::Open(OpenRequest { actor_id: hero, target_id: door }), vec![]),
            (
                Request::MeleeAttack(MeleeAttackRequest { attacker_id: hero, target_id: brute }),
                vec![100, 15, 1],
            ),
            (Request::Move(MoveRequest { actor_id: hero, direction: Direction::North }), vec![]),
        ];
        for (request, rolls) in requests {
            run(&mut server, request, rolls).apply(&mut client).unwrap();
        }

        // the server delayed the hero's timer and holds items the client never saw
        assert_ne!(client.entities, server.entities);
        assert_eq!(client.entities_hash(), server.entities_hash());
    }

    #[test]
    fn test_attack_and_toggle_replay_idempotent() {
        let Scene { mut server, hero, door, brute } = scene();
        let mut replica = server.clone();

        let attack = run(
            &mut server,
            Request::MeleeAttack(MeleeAttackRequest { attacker_id: hero, target_id: brute }),
            vec![100, 15, 1],
        );
        let toggle = run(&mut server, Request::Open(OpenRequest { actor_id: hero, target_id: door }), vec![]);

        for resp in [&attack, &toggle] {
            resp.apply(&mut replica).unwrap();
            let once = replica.clone();
            resp.apply(&mut replica).unwrap();
            assert_eq!(replica, once);
        }
    }

    #[test]
    fn test_lethal_replay_idempotent() {
        let Scene { mut server, hero, brute, .. } = scene();
        let mut replica = server.clone();
        server.entities.get_mut(&brute).unwrap().health = 2;
        replica.entities.get_mut(&brute).unwrap().health = 2;

        let attack = run(
            &mut server,
            Request::MeleeAttack(MeleeAttackRequest { attacker_id: hero, target_id: brute }),
            vec![100, 15, 1],
        );
        assert!(matches!(attack, Response::MeleeAttack(r) if r.health_remaining == 0));

        attack.apply(&mut replica).unwrap();
        assert!(!replica.entities.contains(&brute));
        let once = replica.clone();
        attack.apply(&mut replica).unwrap();
        assert_eq!(replica, once);
    }

    #[test]
    fn test_view_replaces_entity_set() {
        let Scene { server, hero, .. } = scene();
        let mut replica = server.clone();
        let stranger = Entity::new(Position::new(40, 40), Passability::passable(), 1);
        replica.spawn(stranger.clone()).unwrap();

        let only_hero = server.entities.get(&hero).unwrap().clone();
        let view = Response::View(ViewResponse { actor_id: hero, objects: vec![only_hero] });
        view.apply(&mut replica).unwrap();

        assert_eq!(replica.entities.len(), 1);
        assert!(!replica.entities.contains(&stranger.id));
        assert!(replica.entities.contains(&hero));
    }

    #[test]
    fn test_move_for_unknown_entity_fails() {
        let mut replica = World::new();
        let ghost = Uuid::new_v4();
        let err = Response::Move(MoveResponse { actor_id: ghost, x: 1, y: 1 })
            .apply(&mut replica)
            .unwrap_err();
        assert!(matches!(err, ReplayError::MissingEntity(id) if id == ghost));
    }

    #[test]
    fn test_wrapper_stops_at_first_failure() {
        let Scene { server, hero, .. } = scene();
        let mut replica = server.clone();
        let ghost = Uuid::new_v4();

        let wrapper = Response::Wrapper(vec![
            Response::Move(MoveResponse { actor_id: hero, x: 3, y: 3 }),
            Response::Move(MoveResponse { actor_id: ghost, x: 0, y: 0 }),
            Response::Move(MoveResponse { actor_id: hero, x: 9, y: 9 }),
        ]);

        assert!(wrapper.apply(&mut replica).is_err());
        assert_eq!(replica.entities.get(&hero).unwrap().position, Position::new(3, 3));
    }
}
