//! Boss catalog
//!
//! Bosses guard fixed floors and fight in phases. Each phase carries its own
//! shield and ability loadout; defeating a non-final phase restores HP and
//! moves to the next phase.

use crate::abilities::{ids, AbilityId};
use crate::error::{GameError, GameResult};

/// One stage of a boss fight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BossPhase {
    pub shield: i32,
    pub abilities: Vec<AbilityId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boss {
    pub id: &'static str,
    pub name: &'static str,
    pub floor: u32,
    pub phases: Vec<BossPhase>,
}

impl Boss {
    pub fn phase_count(&self) -> u32 {
        self.phases.len() as u32
    }

    /// Phase by 1-based number
    pub fn phase(&self, number: u32) -> Option<&BossPhase> {
        let index = usize::try_from(number).ok()?.checked_sub(1)?;
        self.phases.get(index)
    }

    pub fn has_phase_after(&self, number: u32) -> bool {
        number < self.phase_count()
    }
}

fn phase(shield: i32, abilities: &[AbilityId]) -> BossPhase {
    BossPhase {
        shield,
        abilities: abilities.to_vec(),
    }
}

/// Lookup table for every boss
#[derive(Debug, Clone)]
pub struct BossCatalog {
    bosses: Vec<Boss>,
}

impl BossCatalog {
    pub fn builtin() -> Self {
        let bosses = vec![
            Boss {
                id: "mammon",
                name: "Mammon",
                floor: 5,
                phases: vec![
                    phase(0, &[ids::IRON_WALL]),
                    phase(10, &[ids::PAIR_MASTER, ids::SAFE_BET]),
                ],
            },
            Boss {
                id: "eligor",
                name: "Eligor",
                floor: 10,
                phases: vec![
                    phase(0, &[ids::STEADY_HAND, ids::PAIR_MASTER]),
                    phase(15, &[ids::HIGH_ROLLER, ids::TRIPLE_THREAT]),
                ],
            },
            Boss {
                id: "lucifuge",
                name: "Lucifuge",
                floor: 15,
                phases: vec![
                    phase(0, &[ids::IRON_WALL, ids::STEADY_HAND]),
                    phase(10, &[ids::HIGH_ROLLER, ids::STORM_CALLER]),
                    phase(20, &[ids::TRIPLE_THREAT, ids::VAMPIRIC_TOUCH, ids::SECOND_WIND]),
                ],
            },
        ];
        Self { bosses }
    }

    pub fn get(&self, id: &str) -> GameResult<&Boss> {
        self.bosses
            .iter()
            .find(|b| b.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| GameError::not_found(format!("boss {}", id)))
    }

    /// Boss guarding a floor, if any
    pub fn for_floor(&self, floor: u32) -> Option<&Boss> {
        self.bosses.iter().find(|b| b.floor == floor)
    }

    pub fn all(&self) -> &[Boss] {
        &self.bosses
    }
}

impl Default for BossCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abilities::AbilityRegistry;

    #[test]
    fn test_lookup() {
        let catalog = BossCatalog::builtin();
        assert_eq!(catalog.get("mammon").unwrap().phase_count(), 2);
        assert_eq!(catalog.get("Lucifuge").unwrap().phase_count(), 3);
        assert!(matches!(catalog.get("baal"), Err(GameError::NotFound(_))));
        assert_eq!(catalog.for_floor(10).unwrap().id, "eligor");
        assert!(catalog.for_floor(3).is_none());
    }

    #[test]
    fn test_phase_numbering() {
        let catalog = BossCatalog::builtin();
        let boss = catalog.get("eligor").unwrap();
        assert!(boss.phase(0).is_none());
        assert_eq!(boss.phase(1).unwrap().shield, 0);
        assert_eq!(boss.phase(2).unwrap().shield, 15);
        assert!(boss.phase(3).is_none());
        assert!(boss.has_phase_after(1));
        assert!(!boss.has_phase_after(2));
    }

    #[test]
    fn test_loadouts_are_valid() {
        let registry = AbilityRegistry::builtin();
        for boss in BossCatalog::builtin().all() {
            for phase in &boss.phases {
                registry.validate_loadout(&phase.abilities, 4).unwrap();
            }
        }
    }
}
