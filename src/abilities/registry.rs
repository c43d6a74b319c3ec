//! Ability registry and phase dispatch

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, warn};

use super::{Ability, AbilityId, AbilityInfo, TriggerPhase, TurnState};
use crate::combat::DiceSource;
use crate::error::{GameError, GameResult};

/// Collects abilities before the registry is frozen
#[derive(Debug, Default)]
pub struct AbilityRegistryBuilder {
    abilities: HashMap<AbilityId, Ability>,
    order: Vec<AbilityId>,
}

impl AbilityRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an ability; a duplicate id replaces the earlier entry
    pub fn register(mut self, ability: Ability) -> Self {
        let id = ability.id;
        if let Some(previous) = self.abilities.insert(id, ability) {
            warn!(
                ability_id = id,
                replaced = previous.code,
                "Duplicate ability registration, overwriting"
            );
        } else {
            self.order.push(id);
        }
        self
    }

    pub fn build(self) -> AbilityRegistry {
        AbilityRegistry {
            abilities: self.abilities,
            order: self.order,
        }
    }
}

/// Immutable ability table, shared by every duel
#[derive(Debug)]
pub struct AbilityRegistry {
    abilities: HashMap<AbilityId, Ability>,
    order: Vec<AbilityId>,
}

impl AbilityRegistry {
    /// Registry holding the built-in catalog
    pub fn builtin() -> Self {
        super::builtin_abilities()
            .into_iter()
            .fold(AbilityRegistryBuilder::new(), |b, a| b.register(a))
            .build()
    }

    pub fn get(&self, id: AbilityId) -> Option<&Ability> {
        self.abilities.get(&id)
    }

    pub fn contains(&self, id: AbilityId) -> bool {
        self.abilities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// All ids in registration order
    pub fn ids(&self) -> Vec<AbilityId> {
        self.order.clone()
    }

    /// Catalog listing in registration order
    pub fn catalog(&self) -> Vec<AbilityInfo> {
        self.order
            .iter()
            .filter_map(|id| self.abilities.get(id))
            .map(Ability::info)
            .collect()
    }

    /// Check an equip list: at most `max` entries, all known, no repeats
    pub fn validate_loadout(&self, ids: &[AbilityId], max: usize) -> GameResult<()> {
        if ids.len() > max {
            return Err(GameError::validation(format!(
                "at most {} abilities may be equipped, got {}",
                max,
                ids.len()
            )));
        }
        for (i, id) in ids.iter().enumerate() {
            if !self.contains(*id) {
                return Err(GameError::not_found(format!("ability {}", id)));
            }
            if ids[..i].contains(id) {
                return Err(GameError::validation(format!(
                    "ability {} equipped twice",
                    id
                )));
            }
        }
        Ok(())
    }

    /// Fire every equipped ability bound to `phase`, in equip order
    ///
    /// Each handler runs against a scratch copy of the state. A handler that
    /// errors or panics is logged and skipped, and the state is left as it
    /// was before that handler. Returns the ids that fired.
    pub fn dispatch(
        &self,
        phase: TriggerPhase,
        equipped: &[AbilityId],
        state: &mut TurnState,
        dice: &dyn DiceSource,
    ) -> Vec<AbilityId> {
        let mut fired = Vec::new();
        if phase == TriggerPhase::Passive {
            return fired;
        }

        for id in equipped {
            let Some(ability) = self.abilities.get(id) else {
                debug!(ability_id = id, "Skipping unknown ability");
                continue;
            };
            if ability.trigger != phase || state.has_triggered(*id) || !ability.can_apply(state) {
                continue;
            }

            let mut scratch = state.clone();
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| ability.apply(&mut scratch, dice)));

            match outcome {
                Ok(Ok(())) => {
                    scratch.mark_triggered(*id);
                    *state = scratch;
                    fired.push(*id);
                    debug!(
                        battle_id = state.battle_id,
                        ability = ability.code,
                        %phase,
                        "Ability fired"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        battle_id = state.battle_id,
                        ability_id = *id,
                        ability = ability.name,
                        %phase,
                        error = %e,
                        "Ability failed, skipping"
                    );
                }
                Err(_) => {
                    error!(
                        battle_id = state.battle_id,
                        ability_id = *id,
                        ability = ability.name,
                        %phase,
                        "Ability panicked, skipping"
                    );
                }
            }
        }

        fired
    }
}
