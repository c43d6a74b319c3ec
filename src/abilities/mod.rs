//! Ability system
//!
//! Abilities are immutable tagged variants: an identifier, a trigger phase,
//! an optional applicability predicate and a pure effect over `TurnState`.
//! They are registered once into an `AbilityRegistry` at startup and shared
//! read-only by the duel engine.

mod catalog;
mod registry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::combat::{Actor, Dice, DiceSource, HandRank, HandResult};
use crate::BattleId;

pub use catalog::{builtin_abilities, ids};
pub use registry::{AbilityRegistry, AbilityRegistryBuilder};

/// Ability identifier (stable across releases; persisted in loadouts)
pub type AbilityId = i64;

/// Most abilities one side may bring into a duel
pub const MAX_LOADOUT: usize = 4;

/// Point in the turn lifecycle at which an ability acts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerPhase {
    /// Once per side, on that side's first half-turn
    BattleStart,
    /// Start of every half-turn, before the roll
    TurnStart,
    /// Right after the roll; may rewrite dice
    DiceRoll,
    /// After hand evaluation; may change provisional damage
    BeforeDamage,
    /// After damage has been applied; post-hoc effects on the acting side
    AfterDamage,
    /// Always-on metadata, never dispatched by phase
    Passive,
}

impl std::fmt::Display for TriggerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriggerPhase::BattleStart => "BATTLE_START",
            TriggerPhase::TurnStart => "TURN_START",
            TriggerPhase::DiceRoll => "DICE_ROLL",
            TriggerPhase::BeforeDamage => "BEFORE_DAMAGE",
            TriggerPhase::AfterDamage => "AFTER_DAMAGE",
            TriggerPhase::Passive => "PASSIVE",
        };
        write!(f, "{}", s)
    }
}

/// Draft/catalog rarity tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

/// Effect-level failure; isolated by dispatch, never fatal to the duel
#[derive(Debug, Error)]
pub enum AbilityError {
    #[error("hand has not been evaluated yet")]
    HandMissing,

    #[error("invalid die index {0}")]
    InvalidDieIndex(usize),

    #[error("invalid die face {0}")]
    InvalidFace(u8),

    #[error("{0}")]
    Effect(String),
}

/// Turn-scoped state that abilities read and rewrite
///
/// Built by the engine for one actor's half-turn. The triggered set records
/// which abilities already fired during this half-turn.
#[derive(Debug, Clone)]
pub struct TurnState {
    pub battle_id: BattleId,
    pub actor: Actor,
    pub turn: u32,
    dice: Dice,
    /// Evaluated hand; `None` until after DICE_ROLL
    pub hand: Option<HandResult>,
    /// Provisional damage; seeded from hand power
    pub damage: i32,
    /// Damage that reached the target's HP (set before AFTER_DAMAGE)
    pub dealt: i32,
    pub actor_hp: i32,
    pub actor_max_hp: i32,
    pub actor_shield: i32,
    pub target_hp: i32,
    pub target_shield: i32,
    triggered: Vec<AbilityId>,
}

impl TurnState {
    /// Fresh state for one half-turn
    pub fn new(battle_id: BattleId, actor: Actor, turn: u32) -> Self {
        Self {
            battle_id,
            actor,
            turn,
            dice: [1, 1, 1],
            hand: None,
            damage: 0,
            dealt: 0,
            actor_hp: 0,
            actor_max_hp: 0,
            actor_shield: 0,
            target_hp: 0,
            target_shield: 0,
            triggered: Vec::new(),
        }
    }

    /// Current dice
    pub fn dice(&self) -> Dice {
        self.dice
    }

    /// Replace all three dice (engine use; faces must already be valid)
    pub(crate) fn load_dice(&mut self, dice: Dice) {
        self.dice = dice;
    }

    /// Rewrite one die
    pub fn set_die(&mut self, index: usize, face: u8) -> Result<(), AbilityError> {
        if index >= self.dice.len() {
            return Err(AbilityError::InvalidDieIndex(index));
        }
        if !crate::combat::is_valid_face(face) {
            return Err(AbilityError::InvalidFace(face));
        }
        self.dice[index] = face;
        Ok(())
    }

    /// Hand rank, or `HandMissing` before evaluation
    pub fn rank(&self) -> Result<HandRank, AbilityError> {
        self.hand.map(|h| h.rank).ok_or(AbilityError::HandMissing)
    }

    /// Whether the hand has been evaluated with the given rank
    pub fn rank_is(&self, rank: HandRank) -> bool {
        self.hand.is_some_and(|h| h.rank == rank)
    }

    /// Heal the acting side, capped at max HP; returns HP actually restored
    pub fn heal_actor(&mut self, amount: i32) -> i32 {
        let actual = amount.max(0).min(self.actor_max_hp - self.actor_hp).max(0);
        self.actor_hp += actual;
        actual
    }

    /// Grant shield to the acting side
    pub fn add_shield(&mut self, amount: i32) {
        self.actor_shield += amount.max(0);
    }

    /// Whether an ability already fired this half-turn
    pub fn has_triggered(&self, id: AbilityId) -> bool {
        self.triggered.contains(&id)
    }

    pub(crate) fn mark_triggered(&mut self, id: AbilityId) {
        self.triggered.push(id);
    }

    /// Abilities that fired this half-turn, in firing order
    pub fn triggered(&self) -> &[AbilityId] {
        &self.triggered
    }
}

/// Effect transform over turn state
pub type EffectFn = fn(&mut TurnState, &dyn DiceSource) -> Result<(), AbilityError>;

/// Applicability predicate
pub type ConditionFn = fn(&TurnState) -> bool;

/// One registered ability
#[derive(Debug, Clone)]
pub struct Ability {
    pub id: AbilityId,
    pub code: &'static str,
    pub name: &'static str,
    pub rarity: Rarity,
    pub trigger: TriggerPhase,
    pub description: &'static str,
    condition: Option<ConditionFn>,
    effect: EffectFn,
}

impl Ability {
    /// Create an ability that always applies when its phase fires
    pub fn new(
        id: AbilityId,
        code: &'static str,
        name: &'static str,
        rarity: Rarity,
        trigger: TriggerPhase,
        effect: EffectFn,
    ) -> Self {
        Self {
            id,
            code,
            name,
            rarity,
            trigger,
            description: "",
            condition: None,
            effect,
        }
    }

    /// Gate the effect behind a predicate
    pub fn when(mut self, condition: ConditionFn) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Attach a one-line description
    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Whether the ability may fire for this state
    pub fn can_apply(&self, state: &TurnState) -> bool {
        self.condition.map_or(true, |cond| cond(state))
    }

    /// Run the effect
    pub fn apply(&self, state: &mut TurnState, dice: &dyn DiceSource) -> Result<(), AbilityError> {
        (self.effect)(state, dice)
    }

    /// Serializable catalog entry
    pub fn info(&self) -> AbilityInfo {
        AbilityInfo {
            id: self.id,
            code: self.code.to_string(),
            name: self.name.to_string(),
            rarity: self.rarity,
            trigger: self.trigger,
            description: self.description.to_string(),
        }
    }
}

/// Catalog metadata as exposed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityInfo {
    pub id: AbilityId,
    pub code: String,
    pub name: String,
    pub rarity: Rarity,
    pub trigger: TriggerPhase,
    pub description: String,
}
