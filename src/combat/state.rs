//! Duel state
//!
//! One `DuelState` per battle. It is only mutated by the duel engine and
//! becomes read-only once its status leaves `Ongoing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hand::HandResult;
use super::mutators::Mutator;
use crate::abilities::AbilityId;
use crate::{BattleId, PlayerId};

/// Which side acts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    Player,
    Enemy,
}

impl Actor {
    pub fn opponent(&self) -> Actor {
        match self {
            Actor::Player => Actor::Enemy,
            Actor::Enemy => Actor::Player,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuelStatus {
    Ongoing,
    Victory,
    Defeat,
    Draw,
}

impl DuelStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DuelStatus::Ongoing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DuelStatus::Ongoing => "ONGOING",
            DuelStatus::Victory => "VICTORY",
            DuelStatus::Defeat => "DEFEAT",
            DuelStatus::Draw => "DRAW",
        }
    }

    /// Score for the PLAYER seat (1.0 win, 0.5 draw, 0.0 loss)
    pub fn player_score(&self) -> Option<f64> {
        match self {
            DuelStatus::Ongoing => None,
            DuelStatus::Victory => Some(1.0),
            DuelStatus::Draw => Some(0.5),
            DuelStatus::Defeat => Some(0.0),
        }
    }
}

impl std::fmt::Display for DuelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// PvE against an AI/boss, or PvP between two drafters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuelKind {
    Pve,
    Pvp,
}

impl DuelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuelKind::Pve => "pve",
            DuelKind::Pvp => "pvp",
        }
    }
}

/// One side of a duel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub hp: i32,
    pub max_hp: i32,
    pub shield: i32,
    pub abilities: Vec<AbilityId>,
    /// BATTLE_START already dispatched for this side
    pub battle_started: bool,
}

impl Combatant {
    pub fn new(hp: i32, shield: i32, abilities: Vec<AbilityId>) -> Self {
        Self {
            hp,
            max_hp: hp,
            shield,
            abilities,
            battle_started: false,
        }
    }

    pub fn is_down(&self) -> bool {
        self.hp <= 0
    }
}

/// Full duel snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuelState {
    pub battle_id: BattleId,
    pub kind: DuelKind,
    pub player_id: PlayerId,
    /// Second participant (PvP only)
    pub opponent_id: Option<PlayerId>,
    pub floor: Option<u32>,
    pub player: Combatant,
    pub enemy: Combatant,
    /// Round counter, starts at 1
    pub turn: u32,
    pub current: Actor,
    pub status: DuelStatus,
    pub boss: Option<String>,
    /// 1-based boss phase; 0 when there is no boss
    pub boss_phase: u32,
    pub mutator: Option<Mutator>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Rating settlement already claimed
    pub settled: bool,
}

impl DuelState {
    pub fn side(&self, actor: Actor) -> &Combatant {
        match actor {
            Actor::Player => &self.player,
            Actor::Enemy => &self.enemy,
        }
    }

    pub fn side_mut(&mut self, actor: Actor) -> &mut Combatant {
        match actor {
            Actor::Player => &mut self.player,
            Actor::Enemy => &mut self.enemy,
        }
    }

    /// Participant who controls `actor`; the PvE enemy has none
    pub fn participant(&self, actor: Actor) -> Option<PlayerId> {
        match actor {
            Actor::Player => Some(self.player_id),
            Actor::Enemy => self.opponent_id,
        }
    }

    /// Seat held by a player in this duel
    pub fn seat_of(&self, player_id: PlayerId) -> Option<Actor> {
        if player_id == self.player_id {
            Some(Actor::Player)
        } else if self.opponent_id == Some(player_id) {
            Some(Actor::Enemy)
        } else {
            None
        }
    }

    pub fn involves(&self, player_id: PlayerId) -> bool {
        self.seat_of(player_id).is_some()
    }

    /// Participants in seat order
    pub fn participants(&self) -> Vec<PlayerId> {
        std::iter::once(self.player_id).chain(self.opponent_id).collect()
    }

    pub fn is_pvp(&self) -> bool {
        self.kind == DuelKind::Pvp
    }

    pub(crate) fn finish(&mut self, status: DuelStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}

/// Request to open a duel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartDuel {
    pub player_id: PlayerId,
    #[serde(default)]
    pub abilities: Vec<AbilityId>,
    #[serde(default)]
    pub floor: Option<u32>,
    /// PvP opponent; `None` for PvE
    #[serde(default)]
    pub opponent_id: Option<PlayerId>,
    /// Enemy loadout (PvP opponent or PvE AI); bosses use their phase loadout
    #[serde(default)]
    pub enemy_abilities: Vec<AbilityId>,
    #[serde(default)]
    pub mutator: Option<String>,
    #[serde(default)]
    pub boss: Option<String>,
    /// Pre-allocated id from matchmaking; never taken from a request body
    #[serde(skip)]
    pub battle_id: Option<BattleId>,
}

/// One actor's resolved half-turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalfTurn {
    pub actor: Actor,
    pub dice: [u8; 3],
    pub dice_hash: String,
    /// Hidden under fog
    pub hand: Option<HandResult>,
    pub damage: i32,
    pub absorbed: i32,
    pub dealt: i32,
    pub silenced: bool,
    pub triggered: Vec<AbilityId>,
}

/// Result of `roll_dice`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollResult {
    pub battle_id: BattleId,
    /// Round in which the roll happened
    pub turn: u32,
    #[serde(flatten)]
    pub roll: HalfTurn,
    /// PvE enemy response within the same call
    pub enemy_turn: Option<HalfTurn>,
    /// New boss phase when the roll cleared a phase
    pub boss_phase_transition: Option<u32>,
    pub fog: bool,
    pub player_hp: i32,
    pub enemy_hp: i32,
    pub player_shield: i32,
    pub enemy_shield: i32,
    pub status: DuelStatus,
    /// Who acts next (meaningless once terminal)
    pub current_actor: Actor,
    /// Round counter after the roll
    pub next_turn: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pvp() -> DuelState {
        DuelState {
            battle_id: 3,
            kind: DuelKind::Pvp,
            player_id: 10,
            opponent_id: Some(20),
            floor: None,
            player: Combatant::new(100, 0, vec![1]),
            enemy: Combatant::new(100, 0, vec![2]),
            turn: 1,
            current: Actor::Player,
            status: DuelStatus::Ongoing,
            boss: None,
            boss_phase: 0,
            mutator: None,
            started_at: Utc::now(),
            ended_at: None,
            settled: false,
        }
    }

    #[test]
    fn test_seats() {
        let duel = pvp();
        assert_eq!(duel.seat_of(10), Some(Actor::Player));
        assert_eq!(duel.seat_of(20), Some(Actor::Enemy));
        assert_eq!(duel.seat_of(30), None);
        assert_eq!(duel.participants(), vec![10, 20]);
        assert_eq!(duel.participant(Actor::Enemy), Some(20));
    }

    #[test]
    fn test_status_scores() {
        assert_eq!(DuelStatus::Ongoing.player_score(), None);
        assert_eq!(DuelStatus::Victory.player_score(), Some(1.0));
        assert_eq!(DuelStatus::Draw.player_score(), Some(0.5));
        assert!(DuelStatus::Defeat.is_terminal());
        assert!(!DuelStatus::Ongoing.is_terminal());
    }

    #[test]
    fn test_finish_stamps_end() {
        let mut duel = pvp();
        duel.finish(DuelStatus::Draw);
        assert_eq!(duel.status, DuelStatus::Draw);
        assert!(duel.ended_at.is_some());
    }

    #[test]
    fn test_state_json_roundtrip() {
        let duel = pvp();
        let json = serde_json::to_string(&duel).unwrap();
        assert!(json.contains("\"ONGOING\""));
        let back: DuelState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, duel);
    }
}
