//! World State Hashing
//!
//! Provides deterministic hashing of world state for:
//! - Comparing a replayed client copy against the server world
//!   ([`compute_entities_hash`], since clients hold no items)
//! - Debug logging after each processed request

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::world::entity::{Entity, EntitySet, PassabilityKind};
use crate::world::item::{DamageType, Item};
use crate::world::state::World;

/// SHA-256 digest of a world.
pub type StateHash = [u8; 32];

const DOMAIN: &[u8] = b"GRIDHOLD_WORLD_V2";
const ENTITIES_DOMAIN: &[u8] = b"GRIDHOLD_ENTITIES_V2";

/// Field feeder over SHA-256. Integers go in little-endian.
struct Feed(Sha256);

impl Feed {
    fn put(&mut self, bytes: impl AsRef<[u8]>) {
        self.0.update(bytes);
    }

    fn tag(&mut self, tag: u8) {
        self.0.update([tag]);
    }

    /// `None` hashes as a lone 0 tag, never colliding with an id.
    fn slot(&mut self, id: Option<&Uuid>) {
        match id {
            Some(id) => {
                self.tag(1);
                self.put(id.as_bytes());
            }
            None => self.tag(0),
        }
    }
}

fn hash_entity(h: &mut Feed, entity: &Entity) {
    h.put(entity.id.as_bytes());
    h.put(entity.position.x.to_le_bytes());
    h.put(entity.position.y.to_le_bytes());
    h.tag(match entity.passability.kind {
        PassabilityKind::AlwaysImpassible => 0,
        PassabilityKind::AlwaysPassable => 1,
        PassabilityKind::Toggleable => 2,
    });
    h.tag(entity.passability.is_open as u8);

    let attrs = &entity.attributes;
    for score in [attrs.dexterity, attrs.luck, attrs.strength, attrs.wisdom] {
        h.put(score.0.to_le_bytes());
    }

    let eq = &entity.equipment;
    for slot in [
        eq.head_id,
        eq.hands_id,
        eq.primary_item_id,
        eq.secondary_item_id,
        eq.legs_id,
        eq.chest_id,
    ] {
        h.slot(slot.as_ref());
    }

    h.put(entity.health.to_le_bytes());
}

fn hash_item(h: &mut Feed, item: &Item) {
    h.put(item.id.as_bytes());
    h.put(item.damage.die_range.to_le_bytes());
    h.put(item.damage.modifier.to_le_bytes());
    h.put(item.damage.roll_amount.to_le_bytes());
    h.tag(match item.damage.damage_type {
        DamageType::Melee => 0,
        DamageType::Range => 1,
    });
    h.put(item.armor.melee_reduction.to_le_bytes());
    h.put(item.armor.range_reduction.to_le_bytes());
}

fn feed_entities(h: &mut Feed, entities: &EntitySet) {
    h.put((entities.len() as u32).to_le_bytes());
    let mut sorted: Vec<&Entity> = entities.iter().collect();
    sorted.sort_by_key(|e| e.id);
    for entity in sorted {
        hash_entity(h, entity);
    }
}

/// Compute the hash of a world.
///
/// Entities and items are both hashed in identifier order. Timers are left
/// out since replay never carries them.
pub fn compute_world_hash(world: &World) -> StateHash {
    let mut h = Feed(Sha256::new());
    h.put(DOMAIN);
    feed_entities(&mut h, &world.entities);

    h.put((world.items.len() as u32).to_le_bytes());
    for item in world.items.iter() {
        hash_item(&mut h, item);
    }

    h.0.finalize().into()
}

/// Hash of the entity set alone.
///
/// Replayed client copies never receive items, so this is the value to
/// compare between a client and the server.
pub fn compute_entities_hash(entities: &EntitySet) -> StateHash {
    let mut h = Feed(Sha256::new());
    h.put(ENTITIES_DOMAIN);
    feed_entities(&mut h, entities);
    h.0.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::entity::{Passability, Position};

    #[test]
    fn test_empty_world_hash_stable() {
        assert_eq!(compute_world_hash(&World::new()), compute_world_hash(&World::new()));
    }

    #[test]
    fn test_hash_tracks_mutation() {
        let mut world = World::new();
        let door = Entity::new(Position::new(0, 0), Passability::toggleable(false), 5);
        let door_id = door.id;
        world.spawn(door).unwrap();

        let before = compute_world_hash(&world);
        world.entities.get_mut(&door_id).unwrap().passability.is_open = true;
        assert_ne!(before, compute_world_hash(&world));
    }

    #[test]
    fn test_hash_ignores_order_and_timers() {
        let a = Entity::new(Position::new(0, 0), Passability::passable(), 1);
        let b = Entity::new(Position::new(1, 0), Passability::passable(), 1);

        let mut ab = World::new();
        ab.spawn(a.clone()).unwrap();
        ab.spawn(b.clone()).unwrap();

        let mut ba = World::new();
        ba.spawn(b).unwrap();
        ba.spawn(a.clone()).unwrap();
        assert_eq!(compute_world_hash(&ab), compute_world_hash(&ba));

        ba.entities.get_mut(&a.id).unwrap().timer.next_timestamp = 99;
        assert_eq!(compute_world_hash(&ab), compute_world_hash(&ba));
    }

    #[test]
    fn test_entities_hash_ignores_items() {
        let mut world = World::new();
        world.spawn(Entity::new(Position::new(0, 0), Passability::passable(), 1)).unwrap();
        let bare = world.clone();
        world.add_item(Item::armor(crate::world::item::Armor::default()));

        assert_ne!(compute_world_hash(&world), compute_world_hash(&bare));
        assert_eq!(
            compute_entities_hash(&world.entities),
            compute_entities_hash(&bare.entities)
        );
    }
}
