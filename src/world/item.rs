//! Item Definitions
//!
//! Weapons and armor referenced by entity equipment slots.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::core::rng::Dice;

/// What kind of attack an item's damage belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    /// Adds Strength, reduced by melee armor.
    #[default]
    Melee,
    /// Adds Dexterity, reduced by range armor.
    Range,
}

/// Damage dice of a weapon: `roll_amount`d`die_range` + `modifier`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Damage {
    /// Faces per die.
    pub die_range: u32,
    /// Flat bonus added to the roll.
    pub modifier: i32,
    /// Number of dice.
    pub roll_amount: u32,
    /// Melee or range.
    pub damage_type: DamageType,
}

impl Damage {
    /// Bare-handed damage, 1d4+0.
    pub const UNARMED: Damage = Damage {
        die_range: 4,
        modifier: 0,
        roll_amount: 1,
        damage_type: DamageType::Melee,
    };

    /// Roll the dice once and add the flat modifier, saturating.
    pub fn roll(&self, dice: &mut dyn Dice) -> i32 {
        dice.roll(self.roll_amount, self.die_range).saturating_add(self.modifier)
    }
}

/// Damage reductions by damage type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Armor {
    /// Applied against melee hits.
    pub melee_reduction: i32,
    /// Applied against range hits.
    pub range_reduction: i32,
}

impl Armor {
    /// Reduction for the given damage type.
    pub fn reduction(&self, damage_type: DamageType) -> i32 {
        match damage_type {
            DamageType::Melee => self.melee_reduction,
            DamageType::Range => self.range_reduction,
        }
    }
}

/// An item with damage and armor profiles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Item {
    /// Unique identifier referenced from [`Equipment`](crate::world::entity::Equipment).
    pub id: Uuid,
    /// Damage when wielded as the primary item.
    #[serde(default)]
    pub damage: Damage,
    /// Reductions when worn in the chest slot.
    #[serde(default)]
    pub armor: Armor,
}

impl Item {
    /// A weapon with the given damage profile.
    pub fn weapon(damage: Damage) -> Self {
        Self { id: Uuid::new_v4(), damage, armor: Armor::default() }
    }

    /// Body armor with the given reductions.
    pub fn armor(armor: Armor) -> Self {
        Self { id: Uuid::new_v4(), damage: Damage::default(), armor }
    }
}

/// Items keyed by identifier. Serialized as a list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Item>", into = "Vec<Item>")]
pub struct ItemSet {
    items: BTreeMap<Uuid, Item>,
}

impl ItemSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by identifier.
    pub fn insert(&mut self, item: Item) {
        self.items.insert(item.id, item);
    }

    /// Look up by identifier.
    pub fn get(&self, id: &Uuid) -> Option<&Item> {
        self.items.get(id)
    }

    /// Look up an optional slot.
    pub fn get_slot(&self, slot: Option<Uuid>) -> Option<&Item> {
        slot.and_then(|id| self.items.get(&id))
    }

    /// Remove by identifier.
    pub fn remove(&mut self, id: &Uuid) -> Option<Item> {
        self.items.remove(id)
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }
}

impl From<Vec<Item>> for ItemSet {
    fn from(list: Vec<Item>) -> Self {
        let mut set = ItemSet::new();
        for item in list {
            set.insert(item);
        }
        set
    }
}

impl From<ItemSet> for Vec<Item> {
    fn from(set: ItemSet) -> Self {
        set.items.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::ScriptedDice;

    #[test]
    fn test_damage_roll_adds_modifier() {
        let sword = Damage {
            die_range: 8,
            modifier: 2,
            roll_amount: 1,
            damage_type: DamageType::Melee,
        };
        let mut dice = ScriptedDice::new([5]);
        assert_eq!(sword.roll(&mut dice), 7);
    }

    #[test]
    fn test_armor_reduction_by_type() {
        let armor = Armor { melee_reduction: 3, range_reduction: 1 };
        assert_eq!(armor.reduction(DamageType::Melee), 3);
        assert_eq!(armor.reduction(DamageType::Range), 1);
    }

    #[test]
    fn test_item_set_serializes_as_list() {
        let bow = Item::weapon(Damage {
            die_range: 6,
            modifier: 0,
            roll_amount: 1,
            damage_type: DamageType::Range,
        });
        let mut set = ItemSet::new();
        set.insert(bow.clone());

        let json = serde_json::to_value(&set).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["damage"]["damage_type"], "range");

        let parsed: ItemSet = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.get(&bow.id), Some(&bow));
        assert!(parsed.get_slot(None).is_none());
    }
}
