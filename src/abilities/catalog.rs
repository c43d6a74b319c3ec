//! Built-in abilities

use super::{Ability, AbilityError, Rarity, TriggerPhase, TurnState};
use crate::combat::{DiceSource, HandRank};

/// Stable ids of the built-in abilities
pub mod ids {
    use super::super::AbilityId;

    pub const LUCKY_REROLL: AbilityId = 1;
    pub const STEADY_HAND: AbilityId = 2;
    pub const SAFE_BET: AbilityId = 3;
    pub const HIGH_ROLLER: AbilityId = 4;
    pub const PAIR_MASTER: AbilityId = 5;
    pub const IRON_WALL: AbilityId = 6;
    pub const TRIPLE_THREAT: AbilityId = 7;
    pub const VAMPIRIC_TOUCH: AbilityId = 8;
    pub const SECOND_WIND: AbilityId = 9;
    pub const STORM_CALLER: AbilityId = 10;
}

const IRON_WALL_SHIELD: i32 = 15;
const SECOND_WIND_THRESHOLD: i32 = 30;
const SECOND_WIND_HEAL: i32 = 15;

fn lucky_reroll(s: &mut TurnState, dice: &dyn DiceSource) -> Result<(), AbilityError> {
    let index = dice.index(3);
    s.set_die(index, dice.roll_die())
}

fn steady_hand(s: &mut TurnState, _: &dyn DiceSource) -> Result<(), AbilityError> {
    let current = s.dice();
    for (i, face) in current.iter().enumerate() {
        if *face == 1 {
            s.set_die(i, 2)?;
        }
    }
    Ok(())
}

fn has_one(s: &TurnState) -> bool {
    s.dice().contains(&1)
}

fn safe_bet(s: &mut TurnState, _: &dyn DiceSource) -> Result<(), AbilityError> {
    s.damage *= 2;
    Ok(())
}

fn high_roller(s: &mut TurnState, dice: &dyn DiceSource) -> Result<(), AbilityError> {
    let current = s.dice();
    let (index, _) = current
        .iter()
        .enumerate()
        .min_by_key(|(_, face)| **face)
        .ok_or_else(|| AbilityError::Effect("no dice".into()))?;
    let face = 4 + dice.index(3) as u8;
    s.set_die(index, face)
}

fn lowest_below_four(s: &TurnState) -> bool {
    s.dice().iter().any(|face| *face < 4)
}

fn pair_master(s: &mut TurnState, _: &dyn DiceSource) -> Result<(), AbilityError> {
    s.damage += 7;
    Ok(())
}

fn iron_wall(s: &mut TurnState, _: &dyn DiceSource) -> Result<(), AbilityError> {
    s.add_shield(IRON_WALL_SHIELD);
    Ok(())
}

fn triple_threat(s: &mut TurnState, _: &dyn DiceSource) -> Result<(), AbilityError> {
    s.damage += s.damage / 2;
    Ok(())
}

fn vampiric_touch(s: &mut TurnState, _: &dyn DiceSource) -> Result<(), AbilityError> {
    s.heal_actor(s.dealt / 4);
    Ok(())
}

fn second_wind(s: &mut TurnState, _: &dyn DiceSource) -> Result<(), AbilityError> {
    s.heal_actor(SECOND_WIND_HEAL);
    Ok(())
}

fn storm_caller(s: &mut TurnState, _: &dyn DiceSource) -> Result<(), AbilityError> {
    s.damage += 15;
    Ok(())
}

/// The built-in catalog, in draft-pool order
pub fn builtin_abilities() -> Vec<Ability> {
    vec![
        Ability::new(
            ids::LUCKY_REROLL,
            "lucky_reroll",
            "Lucky Reroll",
            Rarity::Common,
            TriggerPhase::DiceRoll,
            lucky_reroll,
        )
        .describe("Re-roll one random die"),
        Ability::new(
            ids::STEADY_HAND,
            "steady_hand",
            "Steady Hand",
            Rarity::Common,
            TriggerPhase::DiceRoll,
            steady_hand,
        )
        .when(has_one)
        .describe("Every 1 becomes a 2"),
        Ability::new(
            ids::SAFE_BET,
            "safe_bet",
            "Safe Bet",
            Rarity::Common,
            TriggerPhase::BeforeDamage,
            safe_bet,
        )
        .when(|s| s.rank_is(HandRank::NoHand))
        .describe("Double damage when no hand is made"),
        Ability::new(
            ids::HIGH_ROLLER,
            "high_roller",
            "High Roller",
            Rarity::Rare,
            TriggerPhase::DiceRoll,
            high_roller,
        )
        .when(lowest_below_four)
        .describe("The lowest die below 4 is re-rolled into 4-6"),
        Ability::new(
            ids::PAIR_MASTER,
            "pair_master",
            "Pair Master",
            Rarity::Common,
            TriggerPhase::BeforeDamage,
            pair_master,
        )
        .when(|s| s.rank_is(HandRank::Pair))
        .describe("+7 damage on a Pair"),
        Ability::new(
            ids::IRON_WALL,
            "iron_wall",
            "Iron Wall",
            Rarity::Rare,
            TriggerPhase::BattleStart,
            iron_wall,
        )
        .describe("Start the battle with 15 shield"),
        Ability::new(
            ids::TRIPLE_THREAT,
            "triple_threat",
            "Triple Threat",
            Rarity::Epic,
            TriggerPhase::BeforeDamage,
            triple_threat,
        )
        .when(|s| s.rank_is(HandRank::Triple) || s.rank_is(HandRank::Ace))
        .describe("+50% damage on a Triple or Ace"),
        Ability::new(
            ids::VAMPIRIC_TOUCH,
            "vampiric_touch",
            "Vampiric Touch",
            Rarity::Epic,
            TriggerPhase::AfterDamage,
            vampiric_touch,
        )
        .when(|s| s.dealt >= 4)
        .describe("Heal a quarter of the damage that hit"),
        Ability::new(
            ids::SECOND_WIND,
            "second_wind",
            "Second Wind",
            Rarity::Rare,
            TriggerPhase::TurnStart,
            second_wind,
        )
        .when(|s| s.actor_hp <= SECOND_WIND_THRESHOLD)
        .describe("Heal 15 at turn start while at 30 HP or less"),
        Ability::new(
            ids::STORM_CALLER,
            "storm_caller",
            "Storm Caller",
            Rarity::Legendary,
            TriggerPhase::BeforeDamage,
            storm_caller,
        )
        .when(|s| s.hand.is_some_and(|h| h.rank.is_sequence()))
        .describe("+15 damage on any run"),
    ]
}
