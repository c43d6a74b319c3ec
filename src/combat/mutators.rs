//! Floor mutators
//!
//! A mutator changes the rules of one duel:
//! - `gravity`: faces 1-2 become 3
//! - `chaos`: one random die is re-rolled
//! - `endurance`: both sides start at 150 HP
//! - `silence`: a coin flip per actor roll disables that side's abilities
//! - `fog`: the hand name is hidden from roll results

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::dice::{Dice, DiceSource};
use crate::error::GameError;

/// Default starting HP
pub const BASE_HP: i32 = 100;

/// Starting HP under `endurance`
pub const ENDURANCE_HP: i32 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutator {
    Gravity,
    Chaos,
    Endurance,
    Silence,
    Fog,
}

impl Mutator {
    pub fn id(&self) -> &'static str {
        match self {
            Mutator::Gravity => "gravity",
            Mutator::Chaos => "chaos",
            Mutator::Endurance => "endurance",
            Mutator::Silence => "silence",
            Mutator::Fog => "fog",
        }
    }

    /// Starting HP for both sides
    pub fn initial_hp(mutator: Option<Mutator>) -> i32 {
        match mutator {
            Some(Mutator::Endurance) => ENDURANCE_HP,
            _ => BASE_HP,
        }
    }

    /// Rewrite freshly rolled dice, before any ability sees them
    pub fn rewrite_dice(&self, dice: Dice, source: &dyn DiceSource) -> Dice {
        match self {
            Mutator::Gravity => dice.map(|face| if face <= 2 { 3 } else { face }),
            Mutator::Chaos => {
                let mut out = dice;
                out[source.index(out.len())] = source.roll_die();
                out
            }
            _ => dice,
        }
    }

    /// Decide whether this actor's abilities are silenced for the current roll
    pub fn silences(&self, source: &dyn DiceSource) -> bool {
        matches!(self, Mutator::Silence) && source.coin_flip()
    }

    /// Whether roll results hide the hand name
    pub fn hides_hand(&self) -> bool {
        matches!(self, Mutator::Fog)
    }
}

impl FromStr for Mutator {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gravity" => Ok(Mutator::Gravity),
            "chaos" => Ok(Mutator::Chaos),
            "endurance" => Ok(Mutator::Endurance),
            "silence" => Ok(Mutator::Silence),
            "fog" => Ok(Mutator::Fog),
            other => Err(GameError::not_found(format!("mutator {}", other))),
        }
    }
}

impl std::fmt::Display for Mutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::ScriptedDice;

    #[test]
    fn test_parse() {
        assert_eq!("gravity".parse::<Mutator>().unwrap(), Mutator::Gravity);
        assert_eq!(" FOG ".parse::<Mutator>().unwrap(), Mutator::Fog);
        assert!(matches!(
            "inferno".parse::<Mutator>(),
            Err(GameError::NotFound(_))
        ));
    }

    #[test]
    fn test_initial_hp() {
        assert_eq!(Mutator::initial_hp(None), 100);
        assert_eq!(Mutator::initial_hp(Some(Mutator::Gravity)), 100);
        assert_eq!(Mutator::initial_hp(Some(Mutator::Endurance)), 150);
    }

    #[test]
    fn test_gravity_floors_low_faces() {
        let src = ScriptedDice::new(vec![1]);
        assert_eq!(Mutator::Gravity.rewrite_dice([1, 2, 6], &src), [3, 3, 6]);
        assert_eq!(Mutator::Gravity.rewrite_dice([3, 4, 5], &src), [3, 4, 5]);
    }

    #[test]
    fn test_chaos_rerolls_one() {
        let src = ScriptedDice::new(vec![6]);
        assert_eq!(Mutator::Chaos.rewrite_dice([1, 2, 3], &src), [6, 2, 3]);
        assert_eq!(src.consumed(), 1);
    }

    #[test]
    fn test_silence_and_fog() {
        let heads = ScriptedDice::new(vec![1]);
        let tails = ScriptedDice::new(vec![1]).with_coin(false);
        assert!(Mutator::Silence.silences(&heads));
        assert!(!Mutator::Silence.silences(&tails));
        assert!(!Mutator::Fog.silences(&heads));
        assert!(Mutator::Fog.hides_hand());
        assert!(!Mutator::Chaos.hides_hand());
    }
}
