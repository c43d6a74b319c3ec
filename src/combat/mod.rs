//! Dice duel combat
//!
//! - Dice sources (secure and scripted) and the dice hash
//! - Hand evaluation and shield-first damage
//! - Mutators and multi-phase bosses
//! - The duel engine that drives a battle turn by turn

mod bosses;
mod damage;
mod dice;
mod engine;
mod hand;
mod mutators;
mod state;

pub use bosses::{Boss, BossCatalog, BossPhase};
pub use damage::{apply_damage, DamageResult};
pub use dice::{dice_hash, is_valid_face, Dice, DiceSource, ScriptedDice, SecureDice, FACES};
pub use engine::{DuelEngine, DuelSettings, Settlement};
pub use hand::{evaluate, HandRank, HandResult};
pub use mutators::{Mutator, BASE_HP, ENDURANCE_HP};
pub use state::{
    Actor, Combatant, DuelKind, DuelState, DuelStatus, HalfTurn, RollResult, StartDuel,
};
