//! Combat Resolution
//!
//! Melee and range attacks share one resolution path. Dice are consumed in
//! a fixed order: luck 1d100, attack 1d20, then the damage roll (hits only).
//!
//! ## Resolution
//!
//! 1. Critical if the luck roll is at most `luck modifier + 5`, or the d20 shows 20.
//! 2. Hit if critical, or `d20 + strength modifier >= 10 + target dexterity modifier`.
//!    A miss is reported whatever the attacker holds.
//! 3. On a hit the primary item must match the attack kind (unarmed counts as melee).
//! 4. Damage is floored at 0 and doubled on a critical. Arithmetic saturates.
//! 5. The target loses `max(0, armor - damage)` health and is removed at 0.

use tracing::{debug, info};
use uuid::Uuid;

use crate::core::rng::Dice;
use crate::game::execute::{find_actor, find_target, ExecContext, ExecuteError};
use crate::network::protocol::AttackResponse;
use crate::world::entity::Entity;
use crate::world::item::{Damage, DamageType};
use crate::world::state::World;

/// Armor class of an unmodified target.
pub const BASE_ARMOR_CLASS: i32 = 10;

/// A natural roll of this value on the d20 is always critical.
pub const NATURAL_CRITICAL: i32 = 20;

/// Which attack request is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackKind {
    /// Close combat, Strength-driven damage.
    Melee,
    /// Ranged combat, Dexterity-driven damage.
    Range,
}

impl AttackKind {
    /// Damage type a weapon must carry to be used for this attack.
    pub fn damage_type(self) -> DamageType {
        match self {
            AttackKind::Melee => DamageType::Melee,
            AttackKind::Range => DamageType::Range,
        }
    }
}

/// Result of the to-hit phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackRoll {
    /// Face shown by the d20.
    pub natural: i32,
    /// d20 plus the attacker's Strength modifier.
    pub total: i32,
    /// Luck success or natural 20.
    pub critical: bool,
}

impl AttackRoll {
    /// Roll luck then the d20 for `attacker`.
    pub fn roll(attacker: &Entity, dice: &mut dyn Dice) -> Self {
        let luck_threshold = attacker.attributes.luck.modifier() + 5;
        let luck = dice.roll(1, 100);
        let natural = dice.roll(1, 20);

        Self {
            natural,
            total: natural.saturating_add(attacker.attributes.strength.modifier()),
            critical: luck <= luck_threshold || natural == NATURAL_CRITICAL,
        }
    }

    /// Whether this roll beats `armor_class`.
    pub fn hits(&self, armor_class: i32) -> bool {
        self.critical || self.total >= armor_class
    }
}

/// `10 + dexterity modifier`.
pub fn armor_class(target: &Entity) -> i32 {
    BASE_ARMOR_CLASS + target.attributes.dexterity.modifier()
}

/// Pre-armor damage, floored at 0 and doubled on a critical.
fn roll_damage(
    attacker: &Entity,
    weapon: Option<Damage>,
    critical: bool,
    dice: &mut dyn Dice,
) -> i32 {
    let raw = match weapon {
        Some(damage) => {
            let bonus = match damage.damage_type {
                DamageType::Melee => attacker.attributes.strength.modifier(),
                DamageType::Range => attacker.attributes.dexterity.modifier(),
            };
            damage.roll(dice).saturating_add(bonus)
        }
        None => Damage::UNARMED.roll(dice),
    };

    let floored = raw.max(0);
    if critical {
        floored.saturating_mul(2)
    } else {
        floored
    }
}

/// Resolve an attack of `kind` from `attacker_id` against `target_id`.
pub(crate) fn attack(
    world: &mut World,
    attacker_id: Uuid,
    target_id: Uuid,
    kind: AttackKind,
    ctx: &mut ExecContext<'_>,
) -> Result<AttackResponse, ExecuteError> {
    let attacker = find_actor(world, attacker_id)?;
    let target = find_target(world, target_id)?;

    let weapon = world
        .items
        .get_slot(attacker.equipment.primary_item_id)
        .map(|item| item.damage);

    let roll = AttackRoll::roll(attacker, ctx.dice);
    let ac = armor_class(target);

    if !roll.hits(ac) {
        debug!(%attacker_id, %target_id, roll = roll.total, ac, "Attack missed");
        return Ok(AttackResponse {
            attacker_id,
            target_id,
            did_hit: false,
            damage: 0,
            health_remaining: target.health,
        });
    }

    // only a hit needs a usable weapon; unarmed counts as melee
    let wielded = weapon.map(|d| d.damage_type).unwrap_or(DamageType::Melee);
    if wielded != kind.damage_type() {
        return Err(ExecuteError::InvalidTarget(format!(
            "{attacker_id} cannot make a {kind:?} attack with a {wielded:?} weapon"
        )));
    }

    let damage = roll_damage(attacker, weapon, roll.critical, ctx.dice);
    let armor = world
        .items
        .get_slot(target.equipment.chest_id)
        .map(|item| item.armor.reduction(kind.damage_type()))
        .unwrap_or(0)
        .max(0);
    let total = (armor - damage).max(0);
    let health_remaining = target.health.saturating_sub(total).max(0);

    debug!(
        %attacker_id, %target_id,
        roll = roll.total, ac, critical = roll.critical, damage, armor, total,
        "Attack hit"
    );

    if health_remaining == 0 {
        world.entities.remove(&target_id);
        info!(%attacker_id, %target_id, "Target destroyed");
    } else if let Some(target) = world.entities.get_mut(&target_id) {
        target.health = health_remaining;
    }

    Ok(AttackResponse {
        attacker_id,
        target_id,
        did_hit: true,
        damage: total,
        health_remaining,
    })
}
