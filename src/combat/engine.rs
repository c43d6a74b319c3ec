//! Duel engine
//!
//! Owns every duel. Each duel sits behind its own mutex, so rolls against one
//! battle are serialized while different battles run in parallel.
//!
//! A roll resolves one half-turn:
//! 1. BATTLE_START (first half-turn of each side only), then TURN_START
//! 2. roll, mutator rewrite, DICE_ROLL
//! 3. evaluate the hand, BEFORE_DAMAGE, apply damage through the shield
//! 4. AFTER_DAMAGE
//!
//! In PvE the engine answers with the enemy half-turn in the same call. In
//! PvP the second participant rolls for the ENEMY seat.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::bosses::BossCatalog;
use super::damage::apply_damage;
use super::dice::{dice_hash, DiceSource};
use super::hand::evaluate;
use super::mutators::Mutator;
use super::state::{
    Actor, Combatant, DuelKind, DuelState, DuelStatus, HalfTurn, RollResult, StartDuel,
};
use crate::abilities::{AbilityRegistry, TriggerPhase, TurnState, MAX_LOADOUT};
use crate::config::GameConfig;
use crate::db::AbilityList;
use crate::error::{GameError, GameResult};
use crate::events::{EventHub, GameEvent};
use crate::rating::Outcome;
use crate::{BattleId, PlayerId};

#[derive(Debug, Clone, Copy)]
pub struct DuelSettings {
    pub turn_limit: u32,
    pub max_abilities: usize,
}

impl Default for DuelSettings {
    fn default() -> Self {
        Self {
            turn_limit: 10,
            max_abilities: MAX_LOADOUT,
        }
    }
}

impl From<&GameConfig> for DuelSettings {
    fn from(cfg: &GameConfig) -> Self {
        Self {
            turn_limit: cfg.turn_limit,
            max_abilities: cfg.max_abilities.min(MAX_LOADOUT),
        }
    }
}

/// Claim on a finished PvP duel's rating change, handed out once
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub battle_id: BattleId,
    pub status: DuelStatus,
    pub player_id: PlayerId,
    pub opponent_id: PlayerId,
    /// From the PLAYER seat's point of view
    pub outcome: Outcome,
}

pub struct DuelEngine {
    battles: RwLock<HashMap<BattleId, Arc<Mutex<DuelState>>>>,
    registry: Arc<AbilityRegistry>,
    bosses: BossCatalog,
    dice: Arc<dyn DiceSource>,
    events: Arc<EventHub>,
    settings: DuelSettings,
    next_id: AtomicI64,
    pool: Option<SqlitePool>,
}

impl std::fmt::Debug for DuelEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuelEngine")
            .field("settings", &self.settings)
            .field("next_id", &self.next_id)
            .field("pool", &self.pool.is_some())
            .finish()
    }
}

impl DuelEngine {
    pub fn new(
        registry: Arc<AbilityRegistry>,
        bosses: BossCatalog,
        dice: Arc<dyn DiceSource>,
        events: Arc<EventHub>,
        settings: DuelSettings,
        pool: Option<SqlitePool>,
    ) -> Self {
        Self {
            battles: RwLock::new(HashMap::new()),
            registry,
            bosses,
            dice,
            events,
            settings,
            next_id: AtomicI64::new(1),
            pool,
        }
    }

    pub fn registry(&self) -> &AbilityRegistry {
        &self.registry
    }

    pub fn bosses(&self) -> &BossCatalog {
        &self.bosses
    }

    /// Reserve a fresh battle id
    pub fn allocate_battle_id(&self) -> BattleId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Claim an id chosen outside the allocator (a drafted battle)
    pub async fn claim_battle_id(&self, battle_id: BattleId) -> GameResult<()> {
        if self.battles.read().await.contains_key(&battle_id) {
            return Err(GameError::conflict(format!(
                "battle {} already exists",
                battle_id
            )));
        }
        self.skip_past(battle_id)
    }

    fn skip_past(&self, battle_id: BattleId) -> GameResult<()> {
        let next = battle_id
            .checked_add(1)
            .filter(|_| battle_id > 0)
            .ok_or_else(|| {
                GameError::validation(format!("battle id {} is out of range", battle_id))
            })?;
        self.next_id.fetch_max(next, Ordering::SeqCst);
        Ok(())
    }

    async fn slot(&self, battle_id: BattleId) -> GameResult<Arc<Mutex<DuelState>>> {
        self.battles
            .read()
            .await
            .get(&battle_id)
            .cloned()
            .ok_or_else(|| GameError::not_found(format!("battle {}", battle_id)))
    }

    /// Open a duel
    pub async fn start_duel(&self, req: StartDuel) -> GameResult<DuelState> {
        let max = self.settings.max_abilities;
        self.registry.validate_loadout(&req.abilities, max)?;

        let mutator = req
            .mutator
            .as_deref()
            .map(str::parse::<Mutator>)
            .transpose()?;

        if req.opponent_id == Some(req.player_id) {
            return Err(GameError::validation("a player cannot duel themselves"));
        }
        let kind = match req.opponent_id {
            Some(_) => DuelKind::Pvp,
            None => DuelKind::Pve,
        };

        let boss = match (req.boss.as_deref(), kind, req.floor) {
            (Some(_), DuelKind::Pvp, _) => {
                return Err(GameError::validation("boss duels are PvE only"));
            }
            (Some(id), DuelKind::Pve, _) => Some(self.bosses.get(id)?.clone()),
            (None, DuelKind::Pve, Some(floor)) => self.bosses.for_floor(floor).cloned(),
            (None, _, _) => None,
        };

        let (enemy_abilities, enemy_shield) = match boss.as_ref().and_then(|b| b.phase(1)) {
            Some(phase) => (phase.abilities.clone(), phase.shield),
            None => (req.enemy_abilities.clone(), 0),
        };
        self.registry.validate_loadout(&enemy_abilities, max)?;

        let battle_id = match req.battle_id {
            Some(id) => {
                self.skip_past(id)?;
                id
            }
            None => self.allocate_battle_id(),
        };

        let hp = Mutator::initial_hp(mutator);
        let duel = DuelState {
            battle_id,
            kind,
            player_id: req.player_id,
            opponent_id: req.opponent_id,
            floor: req.floor.or(boss.as_ref().map(|b| b.floor)),
            player: Combatant::new(hp, 0, req.abilities.clone()),
            enemy: Combatant::new(hp, enemy_shield, enemy_abilities),
            turn: 1,
            current: Actor::Player,
            status: DuelStatus::Ongoing,
            boss: boss.as_ref().map(|b| b.id.to_string()),
            boss_phase: if boss.is_some() { 1 } else { 0 },
            mutator,
            started_at: Utc::now(),
            ended_at: None,
            settled: false,
        };

        {
            let mut battles = self.battles.write().await;
            if battles.contains_key(&battle_id) {
                return Err(GameError::conflict(format!(
                    "battle {} already exists",
                    battle_id
                )));
            }
            battles.insert(battle_id, Arc::new(Mutex::new(duel.clone())));
        }
        self.persist(&duel).await;

        info!(
            "Duel {} started ({}): player {} vs {}{}{}",
            battle_id,
            kind.as_str(),
            duel.player_id,
            duel.opponent_id
                .map(|id| format!("player {}", id))
                .unwrap_or_else(|| "AI".to_string()),
            duel.boss
                .as_deref()
                .map(|b| format!(", boss {}", b))
                .unwrap_or_default(),
            mutator.map(|m| format!(", mutator {}", m)).unwrap_or_default(),
        );
        Ok(duel)
    }

    /// Resolve the caller's half-turn (plus the AI reply in PvE)
    pub async fn roll_dice(&self, battle_id: BattleId, player_id: PlayerId) -> GameResult<RollResult> {
        let slot = self.slot(battle_id).await?;
        let mut duel = slot.lock().await;

        if duel.status.is_terminal() {
            return Err(GameError::invalid_state(format!(
                "battle {} is over ({})",
                battle_id, duel.status
            )));
        }
        let seat = duel.seat_of(player_id).ok_or_else(|| {
            GameError::invalid_state(format!(
                "player {} is not in battle {}",
                player_id, battle_id
            ))
        })?;
        if seat != duel.current {
            return Err(GameError::invalid_state(format!(
                "not player {}'s turn in battle {}",
                player_id, battle_id
            )));
        }

        let turn = duel.turn;
        let roll = self.half_turn(&mut duel, seat);
        let mut enemy_turn = None;
        let mut transition = None;

        if duel.side(seat.opponent()).is_down() {
            match self.advance_boss_phase(&mut duel, seat) {
                Some(phase) => transition = Some(phase),
                None => {
                    let status = match seat {
                        Actor::Player => DuelStatus::Victory,
                        Actor::Enemy => DuelStatus::Defeat,
                    };
                    duel.finish(status);
                    info!("Duel {} ended: {}", battle_id, status);
                }
            }
        } else {
            match (duel.kind, seat) {
                (DuelKind::Pvp, Actor::Player) => {
                    duel.current = Actor::Enemy;
                }
                (DuelKind::Pve, _) => {
                    let reply = self.half_turn(&mut duel, Actor::Enemy);
                    enemy_turn = Some(reply);
                    if duel.player.is_down() {
                        duel.finish(DuelStatus::Defeat);
                        info!("Duel {} ended: {}", battle_id, DuelStatus::Defeat);
                    } else {
                        self.end_round(&mut duel);
                    }
                }
                (DuelKind::Pvp, Actor::Enemy) => self.end_round(&mut duel),
            }
        }

        let result = RollResult {
            battle_id,
            turn,
            fog: duel.mutator.is_some_and(|m| m.hides_hand()),
            roll,
            enemy_turn,
            boss_phase_transition: transition,
            player_hp: duel.player.hp,
            enemy_hp: duel.enemy.hp,
            player_shield: duel.player.shield,
            enemy_shield: duel.enemy.shield,
            status: duel.status,
            current_actor: duel.current,
            next_turn: duel.turn,
        };

        self.persist(&duel).await;

        let recipients = duel.participants();
        self.events
            .publish_all(&recipients, &GameEvent::DiceResult(result.clone()));
        if !duel.status.is_terminal() {
            self.events.publish_all(
                &recipients,
                &GameEvent::TurnStart {
                    battle_id,
                    turn: duel.turn,
                    actor: duel.current,
                    player_id: duel.participant(duel.current),
                },
            );
        }

        Ok(result)
    }

    /// Read-only snapshot
    pub async fn get_status(&self, battle_id: BattleId) -> GameResult<DuelState> {
        let slot = self.slot(battle_id).await?;
        let duel = slot.lock().await;
        Ok(duel.clone())
    }

    /// Ongoing duel involving a player, if any
    pub async fn ongoing_for(&self, player_id: PlayerId) -> Option<BattleId> {
        let slots: Vec<Arc<Mutex<DuelState>>> =
            self.battles.read().await.values().cloned().collect();
        for slot in slots {
            let duel = slot.lock().await;
            if duel.status == DuelStatus::Ongoing && duel.involves(player_id) {
                return Some(duel.battle_id);
            }
        }
        None
    }

    /// Claim the rating settlement of a finished PvP duel
    ///
    /// Returns `Some` exactly once per duel; PvE and ongoing duels never
    /// settle.
    pub async fn claim_settlement(&self, battle_id: BattleId) -> GameResult<Option<Settlement>> {
        let slot = self.slot(battle_id).await?;
        let mut duel = slot.lock().await;

        if !duel.is_pvp() || duel.settled {
            return Ok(None);
        }
        let (Some(score), Some(opponent_id)) = (duel.status.player_score(), duel.opponent_id)
        else {
            return Ok(None);
        };
        duel.settled = true;
        self.persist(&duel).await;

        Ok(Some(Settlement {
            battle_id,
            status: duel.status,
            player_id: duel.player_id,
            opponent_id,
            outcome: Outcome::from_score(score),
        }))
    }

    pub async fn battle_count(&self) -> usize {
        self.battles.read().await.len()
    }

    /// Reload ongoing duels and resume id allocation after the highest id
    pub async fn restore(&self) -> GameResult<usize> {
        let Some(ref pool) = self.pool else {
            return Ok(0);
        };

        let (max_id,): (Option<i64>,) = sqlx::query_as("SELECT MAX(id) FROM battles")
            .fetch_one(pool)
            .await?;
        if let Some(next) = max_id.and_then(|id| id.checked_add(1)) {
            self.next_id.fetch_max(next, Ordering::SeqCst);
        }

        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, state FROM battles WHERE status = ?")
                .bind(DuelStatus::Ongoing.as_str())
                .fetch_all(pool)
                .await?;

        let mut battles = self.battles.write().await;
        let mut restored = 0;
        for (id, raw) in rows {
            match serde_json::from_str::<DuelState>(&raw) {
                Ok(duel) => {
                    battles.insert(id, Arc::new(Mutex::new(duel)));
                    restored += 1;
                }
                Err(e) => warn!("Skipping unreadable battle {}: {}", id, e),
            }
        }

        info!("Restored {} ongoing duels", restored);
        Ok(restored)
    }

    /// Resolve one actor's half-turn in place
    fn half_turn(&self, duel: &mut DuelState, actor: Actor) -> HalfTurn {
        let dice_src = self.dice.as_ref();
        let silenced = duel.mutator.is_some_and(|m| m.silences(dice_src));
        let equipped = if silenced {
            Vec::new()
        } else {
            duel.side(actor).abilities.clone()
        };

        let mut state = TurnState::new(duel.battle_id, actor, duel.turn);
        {
            let me = duel.side(actor);
            let them = duel.side(actor.opponent());
            state.actor_hp = me.hp;
            state.actor_max_hp = me.max_hp;
            state.actor_shield = me.shield;
            state.target_hp = them.hp;
            state.target_shield = them.shield;
        }

        let registry = self.registry.as_ref();
        if duel.turn == 1 && !duel.side(actor).battle_started {
            registry.dispatch(TriggerPhase::BattleStart, &equipped, &mut state, dice_src);
            duel.side_mut(actor).battle_started = true;
        }
        registry.dispatch(TriggerPhase::TurnStart, &equipped, &mut state, dice_src);

        let mut dice = dice_src.roll();
        if let Some(mutator) = duel.mutator {
            dice = mutator.rewrite_dice(dice, dice_src);
        }
        state.load_dice(dice);
        registry.dispatch(TriggerPhase::DiceRoll, &equipped, &mut state, dice_src);

        let hand = evaluate(&state.dice());
        state.hand = Some(hand);
        state.damage = hand.power;
        registry.dispatch(TriggerPhase::BeforeDamage, &equipped, &mut state, dice_src);

        let hit = apply_damage(state.target_hp, state.target_shield, state.damage);
        state.target_hp = hit.hp_after;
        state.target_shield = hit.shield_after;
        state.dealt = hit.dealt;

        // Post-hoc effects may only touch the acting side
        let settled = (state.target_hp, state.target_shield, state.damage, state.dealt);
        registry.dispatch(TriggerPhase::AfterDamage, &equipped, &mut state, dice_src);
        (state.target_hp, state.target_shield, state.damage, state.dealt) = settled;

        {
            let me = duel.side_mut(actor);
            me.hp = state.actor_hp.clamp(0, me.max_hp);
            me.shield = state.actor_shield.max(0);
        }
        {
            let them = duel.side_mut(actor.opponent());
            them.hp = state.target_hp;
            them.shield = state.target_shield;
        }

        let fog = duel.mutator.is_some_and(|m| m.hides_hand());
        let final_dice = state.dice();
        debug!(
            "Battle {} turn {} {:?}: {:?} -> {} for {} ({} absorbed)",
            duel.battle_id, duel.turn, actor, final_dice, hand.rank, hit.incoming, hit.absorbed
        );

        HalfTurn {
            actor,
            dice: final_dice,
            dice_hash: dice_hash(&final_dice, Utc::now().timestamp_millis()),
            hand: if fog { None } else { Some(hand) },
            damage: hit.incoming,
            absorbed: hit.absorbed,
            dealt: hit.dealt,
            silenced,
            triggered: state.triggered().to_vec(),
        }
    }

    /// Move a defeated boss to its next phase; `None` if there is none
    fn advance_boss_phase(&self, duel: &mut DuelState, attacker: Actor) -> Option<u32> {
        if attacker != Actor::Player {
            return None;
        }
        let boss = self.bosses.get(duel.boss.as_deref()?).ok()?;
        if !boss.has_phase_after(duel.boss_phase) {
            return None;
        }
        let next = duel.boss_phase + 1;
        let phase = boss.phase(next)?;

        duel.boss_phase = next;
        duel.enemy.hp = duel.enemy.max_hp;
        duel.enemy.shield = phase.shield;
        duel.enemy.abilities = phase.abilities.clone();

        info!(
            "Battle {}: {} enters phase {}/{}",
            duel.battle_id,
            boss.name,
            next,
            boss.phase_count()
        );
        Some(next)
    }

    fn end_round(&self, duel: &mut DuelState) {
        if duel.turn >= self.settings.turn_limit {
            duel.finish(DuelStatus::Draw);
            info!("Duel {} ended: {} at turn {}", duel.battle_id, DuelStatus::Draw, duel.turn);
        } else {
            duel.turn += 1;
            duel.current = Actor::Player;
        }
    }

    async fn persist(&self, duel: &DuelState) {
        let Some(ref pool) = self.pool else {
            return;
        };
        let (state, player_abilities, enemy_abilities) = match encode_row(duel) {
            Ok(parts) => parts,
            Err(e) => {
                warn!("Failed to encode battle {}: {}", duel.battle_id, e);
                return;
            }
        };

        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO battles
                (id, kind, player_id, opponent_id, status, player_abilities, enemy_abilities,
                 boss, mutator, state, started_at, ended_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(duel.battle_id)
        .bind(duel.kind.as_str())
        .bind(duel.player_id)
        .bind(duel.opponent_id)
        .bind(duel.status.as_str())
        .bind(player_abilities)
        .bind(enemy_abilities)
        .bind(duel.boss.as_deref())
        .bind(duel.mutator.map(|m| m.id()))
        .bind(state)
        .bind(duel.started_at.to_rfc3339())
        .bind(duel.ended_at.map(|t| t.to_rfc3339()))
        .execute(pool)
        .await;

        if let Err(e) = result {
            warn!("Failed to persist battle {}: {}", duel.battle_id, e);
        }
    }
}

/// Snapshot JSON plus both versioned loadouts
fn encode_row(duel: &DuelState) -> GameResult<(String, String, String)> {
    Ok((
        serde_json::to_string(duel)?,
        AbilityList::encode(&duel.player.abilities)?,
        AbilityList::encode(&duel.enemy.abilities)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abilities::{ids, Ability, AbilityError, AbilityRegistryBuilder, Rarity};
    use crate::combat::{HandRank, ScriptedDice};
    use crate::db::test_utils::test_pool;

    fn engine_with(faces: Vec<u8>) -> DuelEngine {
        engine_from(Arc::new(ScriptedDice::new(faces)), None)
    }

    fn engine_from(dice: Arc<dyn DiceSource>, pool: Option<SqlitePool>) -> DuelEngine {
        DuelEngine::new(
            Arc::new(AbilityRegistry::builtin()),
            BossCatalog::builtin(),
            dice,
            EventHub::shared(),
            DuelSettings::default(),
            pool,
        )
    }

    fn pve(player_id: PlayerId) -> StartDuel {
        StartDuel {
            player_id,
            ..Default::default()
        }
    }

    fn pvp(player_id: PlayerId, opponent_id: PlayerId) -> StartDuel {
        StartDuel {
            player_id,
            opponent_id: Some(opponent_id),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_validation() {
        let engine = engine_with(vec![1]);

        let too_many = StartDuel {
            abilities: vec![1, 2, 3, 4, 5],
            ..pve(1)
        };
        assert!(matches!(
            engine.start_duel(too_many).await,
            Err(GameError::Validation(_))
        ));

        let unknown = StartDuel {
            abilities: vec![404],
            ..pve(1)
        };
        assert!(matches!(
            engine.start_duel(unknown).await,
            Err(GameError::NotFound(_))
        ));

        let bad_mutator = StartDuel {
            mutator: Some("inferno".into()),
            ..pve(1)
        };
        assert!(matches!(
            engine.start_duel(bad_mutator).await,
            Err(GameError::NotFound(_))
        ));

        let bad_boss = StartDuel {
            boss: Some("baal".into()),
            ..pve(1)
        };
        assert!(matches!(
            engine.start_duel(bad_boss).await,
            Err(GameError::NotFound(_))
        ));

        assert_eq!(engine.battle_count().await, 0);
    }

    #[tokio::test]
    async fn test_start_defaults() {
        let engine = engine_with(vec![1]);
        let duel = engine.start_duel(pve(1)).await.unwrap();
        assert_eq!(duel.player.hp, 100);
        assert_eq!(duel.enemy.hp, 100);
        assert_eq!(duel.turn, 1);
        assert_eq!(duel.current, Actor::Player);
        assert_eq!(duel.status, DuelStatus::Ongoing);
        assert_eq!(duel.kind, DuelKind::Pve);

        let endurance = StartDuel {
            mutator: Some("endurance".into()),
            ..pve(2)
        };
        let duel = engine.start_duel(endurance).await.unwrap();
        assert_eq!(duel.player.hp, 150);
        assert_eq!(duel.enemy.max_hp, 150);
    }

    #[tokio::test]
    async fn test_explicit_battle_id() {
        let engine = engine_with(vec![1]);
        let req = StartDuel {
            battle_id: Some(40),
            ..pve(1)
        };
        engine.start_duel(req.clone()).await.unwrap();
        assert!(matches!(
            engine.start_duel(req).await,
            Err(GameError::Conflict(_))
        ));
        assert_eq!(engine.allocate_battle_id(), 41);
    }

    #[tokio::test]
    async fn test_battle_id_out_of_range() {
        let engine = engine_with(vec![1]);
        for id in [i64::MAX, 0, -3] {
            let req = StartDuel {
                battle_id: Some(id),
                ..pve(1)
            };
            assert!(matches!(
                engine.start_duel(req).await,
                Err(GameError::Validation(_))
            ));
        }
        assert_eq!(engine.battle_count().await, 0);
        assert_eq!(engine.allocate_battle_id(), 1);
    }

    #[tokio::test]
    async fn test_claim_battle_id() {
        let engine = engine_with(vec![1]);
        let duel = engine.start_duel(pve(1)).await.unwrap();
        assert!(matches!(
            engine.claim_battle_id(duel.battle_id).await,
            Err(GameError::Conflict(_))
        ));
        assert!(matches!(
            engine.claim_battle_id(i64::MAX).await,
            Err(GameError::Validation(_))
        ));

        engine.claim_battle_id(77).await.unwrap();
        assert_eq!(engine.allocate_battle_id(), 78);
    }

    #[test]
    fn test_settings_cap_loadout() {
        let cfg = GameConfig {
            max_abilities: 9,
            ..GameConfig::default()
        };
        assert_eq!(DuelSettings::from(&cfg).max_abilities, MAX_LOADOUT);
    }

    #[tokio::test]
    async fn test_pve_round() {
        let engine = engine_with(vec![2, 2, 5]);
        let duel = engine.start_duel(pve(1)).await.unwrap();

        let result = engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert_eq!(result.roll.dice, [2, 2, 5]);
        assert_eq!(result.roll.hand.unwrap().rank, HandRank::Pair);
        assert_eq!(result.roll.damage, 9);
        assert_eq!(result.enemy_hp, 91);
        let reply = result.enemy_turn.unwrap();
        assert_eq!(reply.actor, Actor::Enemy);
        assert_eq!(result.player_hp, 91);
        assert_eq!(result.turn, 1);
        assert_eq!(result.next_turn, 2);
        assert_eq!(result.current_actor, Actor::Player);
        assert_eq!(result.roll.dice_hash.len(), 16);
    }

    #[tokio::test]
    async fn test_roll_rejections() {
        let engine = engine_with(vec![2, 2, 5]);
        let duel = engine.start_duel(pvp(1, 2)).await.unwrap();

        assert!(matches!(
            engine.roll_dice(999, 1).await,
            Err(GameError::NotFound(_))
        ));
        assert!(matches!(
            engine.roll_dice(duel.battle_id, 3).await,
            Err(GameError::InvalidState(_))
        ));
        assert!(matches!(
            engine.roll_dice(duel.battle_id, 2).await,
            Err(GameError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_draw_at_turn_limit() {
        // NoHand for 7 each half-turn never finishes 100 HP in 10 rounds
        let engine = engine_with(vec![1, 2, 4]);
        let duel = engine.start_duel(pve(1)).await.unwrap();

        for round in 1..=10 {
            let result = engine.roll_dice(duel.battle_id, 1).await.unwrap();
            assert_eq!(result.turn, round);
            if round < 10 {
                assert_eq!(result.status, DuelStatus::Ongoing);
            }
        }

        let status = engine.get_status(duel.battle_id).await.unwrap();
        assert_eq!(status.status, DuelStatus::Draw);
        assert_eq!(status.player.hp, 30);
        assert!(status.ended_at.is_some());

        assert!(matches!(
            engine.roll_dice(duel.battle_id, 1).await,
            Err(GameError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_victory_skips_enemy_reply() {
        let engine = engine_with(vec![1, 1, 1]);
        let duel = engine.start_duel(pve(1)).await.unwrap();

        let first = engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert_eq!(first.enemy_hp, 40);
        assert_eq!(first.player_hp, 40);

        let second = engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert_eq!(second.status, DuelStatus::Victory);
        assert_eq!(second.enemy_hp, 0);
        assert!(second.enemy_turn.is_none());
        assert_eq!(second.player_hp, 40);
    }

    #[tokio::test]
    async fn test_boss_phase_transition() {
        let engine = engine_with(vec![1, 1, 1]);
        let req = StartDuel {
            boss: Some("mammon".into()),
            ..pve(1)
        };
        let duel = engine.start_duel(req).await.unwrap();
        assert_eq!(duel.boss_phase, 1);
        assert_eq!(duel.enemy.abilities, vec![ids::IRON_WALL]);

        // Round 1: Iron Wall fires on the boss's first half-turn
        let first = engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert_eq!(first.enemy_hp, 40);
        assert_eq!(first.enemy_shield, 15);
        assert_eq!(first.enemy_turn.unwrap().triggered, vec![ids::IRON_WALL]);

        // Round 2: shield soaks 15, 45 finishes phase 1
        let second = engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert_eq!(second.roll.absorbed, 15);
        assert_eq!(second.boss_phase_transition, Some(2));
        assert_eq!(second.status, DuelStatus::Ongoing);
        assert!(second.enemy_turn.is_none());
        assert_eq!(second.enemy_hp, 100);
        assert_eq!(second.enemy_shield, 10);
        assert_eq!(second.next_turn, 2);
        assert_eq!(second.current_actor, Actor::Player);

        let state = engine.get_status(duel.battle_id).await.unwrap();
        assert_eq!(state.boss_phase, 2);
        assert_eq!(state.enemy.abilities, vec![ids::PAIR_MASTER, ids::SAFE_BET]);

        // Phase 2 boss replies with an Ace and finishes the player
        let third = engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert_eq!(third.enemy_hp, 50);
        assert_eq!(third.status, DuelStatus::Defeat);
    }

    #[tokio::test]
    async fn test_final_phase_victory() {
        let engine = engine_with(vec![6, 6, 6]);
        let req = StartDuel {
            boss: Some("mammon".into()),
            ..pve(1)
        };
        let duel = engine.start_duel(req).await.unwrap();
        // Force the boss into its last phase with low HP
        {
            let slot = engine.slot(duel.battle_id).await.unwrap();
            let mut state = slot.lock().await;
            state.boss_phase = 2;
            state.enemy.hp = 10;
            state.enemy.shield = 0;
        }
        let result = engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert_eq!(result.status, DuelStatus::Victory);
        assert_eq!(result.boss_phase_transition, None);
    }

    #[tokio::test]
    async fn test_pvp_split_turns() {
        let engine = engine_with(vec![2, 2, 5]);
        let duel = engine.start_duel(pvp(1, 2)).await.unwrap();
        assert_eq!(duel.kind, DuelKind::Pvp);

        let first = engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert!(first.enemy_turn.is_none());
        assert_eq!(first.current_actor, Actor::Enemy);
        assert_eq!(first.next_turn, 1);
        assert_eq!(first.enemy_hp, 91);

        assert!(matches!(
            engine.roll_dice(duel.battle_id, 1).await,
            Err(GameError::InvalidState(_))
        ));

        let second = engine.roll_dice(duel.battle_id, 2).await.unwrap();
        assert_eq!(second.roll.actor, Actor::Enemy);
        assert_eq!(second.player_hp, 91);
        assert_eq!(second.current_actor, Actor::Player);
        assert_eq!(second.next_turn, 2);
    }

    #[tokio::test]
    async fn test_settlement_claimed_once() {
        let engine = engine_with(vec![1, 1, 1]);
        let duel = engine.start_duel(pvp(1, 2)).await.unwrap();
        assert_eq!(engine.claim_settlement(duel.battle_id).await.unwrap(), None);

        engine.roll_dice(duel.battle_id, 1).await.unwrap();
        engine.roll_dice(duel.battle_id, 2).await.unwrap();
        let end = engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert_eq!(end.status, DuelStatus::Victory);

        let claim = engine.claim_settlement(duel.battle_id).await.unwrap().unwrap();
        assert_eq!(claim.outcome, Outcome::Win);
        assert_eq!(claim.opponent_id, 2);
        assert_eq!(engine.claim_settlement(duel.battle_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pve_never_settles() {
        let engine = engine_with(vec![1, 1, 1]);
        let duel = engine.start_duel(pve(1)).await.unwrap();
        engine.roll_dice(duel.battle_id, 1).await.unwrap();
        engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert_eq!(engine.claim_settlement(duel.battle_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_abilities_shape_damage() {
        let engine = engine_with(vec![2, 2, 5]);
        let req = StartDuel {
            abilities: vec![ids::PAIR_MASTER, ids::SAFE_BET],
            ..pve(1)
        };
        let duel = engine.start_duel(req).await.unwrap();
        let result = engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert_eq!(result.roll.damage, 16);
        assert_eq!(result.roll.triggered, vec![ids::PAIR_MASTER]);
        assert_eq!(result.enemy_hp, 84);
    }

    #[tokio::test]
    async fn test_battle_start_once_per_side() {
        let engine = engine_with(vec![1, 2, 4]);
        let req = StartDuel {
            abilities: vec![ids::IRON_WALL],
            enemy_abilities: vec![ids::IRON_WALL],
            ..pve(1)
        };
        let duel = engine.start_duel(req).await.unwrap();

        let first = engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert_eq!(first.roll.triggered, vec![ids::IRON_WALL]);
        // Enemy shield is granted after the player's hit lands
        assert_eq!(first.enemy_shield, 15);
        // Player shield 15 soaked 7
        assert_eq!(first.player_shield, 8);

        let second = engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert!(second.roll.triggered.is_empty());
    }

    #[tokio::test]
    async fn test_fog_and_silence() {
        let engine = engine_with(vec![2, 2, 5]);
        let fog = StartDuel {
            mutator: Some("fog".into()),
            ..pve(1)
        };
        let duel = engine.start_duel(fog).await.unwrap();
        let result = engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert!(result.fog);
        assert!(result.roll.hand.is_none());
        assert_eq!(result.roll.damage, 9);

        // ScriptedDice answers heads: every actor roll is silenced
        let silence = StartDuel {
            abilities: vec![ids::PAIR_MASTER],
            mutator: Some("silence".into()),
            ..pve(2)
        };
        let duel = engine.start_duel(silence).await.unwrap();
        let result = engine.roll_dice(duel.battle_id, 2).await.unwrap();
        assert!(result.roll.silenced);
        assert!(result.roll.triggered.is_empty());
        assert_eq!(result.roll.damage, 9);
    }

    #[tokio::test]
    async fn test_gravity_rewrites_before_abilities() {
        let engine = engine_with(vec![1, 2, 6]);
        let req = StartDuel {
            abilities: vec![ids::STEADY_HAND],
            mutator: Some("gravity".into()),
            ..pve(1)
        };
        let duel = engine.start_duel(req).await.unwrap();
        let result = engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert_eq!(result.roll.dice, [3, 3, 6]);
        // No 1 left for Steady Hand to lift
        assert!(result.roll.triggered.is_empty());
    }

    fn rewrite_target(s: &mut TurnState, _: &dyn DiceSource) -> Result<(), AbilityError> {
        s.target_hp = 0;
        s.damage = 999;
        s.add_shield(5);
        Ok(())
    }

    #[tokio::test]
    async fn test_after_damage_only_touches_actor() {
        let registry = AbilityRegistryBuilder::new()
            .register(Ability::new(
                50,
                "greedy",
                "Greedy",
                Rarity::Common,
                TriggerPhase::AfterDamage,
                rewrite_target,
            ))
            .build();
        let engine = DuelEngine::new(
            Arc::new(registry),
            BossCatalog::builtin(),
            Arc::new(ScriptedDice::new(vec![1, 2, 4])),
            EventHub::shared(),
            DuelSettings::default(),
            None,
        );
        let req = StartDuel {
            abilities: vec![50],
            ..pve(1)
        };
        let duel = engine.start_duel(req).await.unwrap();
        let result = engine.roll_dice(duel.battle_id, 1).await.unwrap();
        assert_eq!(result.enemy_hp, 93);
        assert_eq!(result.status, DuelStatus::Ongoing);
        // Enemy reply of 7 was soaked by the 5 shield
        assert_eq!(result.player_hp, 98);
    }

    #[tokio::test]
    async fn test_events_follow_roll() {
        let events = EventHub::shared();
        let engine = DuelEngine::new(
            Arc::new(AbilityRegistry::builtin()),
            BossCatalog::builtin(),
            Arc::new(ScriptedDice::new(vec![2, 2, 5])),
            events.clone(),
            DuelSettings::default(),
            None,
        );
        let duel = engine.start_duel(pvp(1, 2)).await.unwrap();
        let mut rx = events.subscribe(2);
        engine.roll_dice(duel.battle_id, 1).await.unwrap();

        assert!(matches!(rx.recv().await, Some(GameEvent::DiceResult(_))));
        match rx.recv().await {
            Some(GameEvent::TurnStart {
                actor, player_id, ..
            }) => {
                assert_eq!(actor, Actor::Enemy);
                assert_eq!(player_id, Some(2));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_restore_from_database() {
        let pool = test_pool().await;
        let dice: Arc<dyn DiceSource> = Arc::new(ScriptedDice::new(vec![2, 2, 5]));

        let engine = engine_from(dice.clone(), Some(pool.clone()));
        let ongoing = engine.start_duel(pve(1)).await.unwrap();
        engine.roll_dice(ongoing.battle_id, 1).await.unwrap();

        let finished = engine
            .start_duel(StartDuel {
                battle_id: Some(9),
                ..pve(2)
            })
            .await
            .unwrap();
        {
            let slot = engine.slot(finished.battle_id).await.unwrap();
            let mut state = slot.lock().await;
            state.finish(DuelStatus::Draw);
            engine.persist(&state).await;
        }

        let restarted = engine_from(dice, Some(pool));
        assert_eq!(restarted.restore().await.unwrap(), 1);
        let state = restarted.get_status(ongoing.battle_id).await.unwrap();
        assert_eq!(state.turn, 2);
        assert_eq!(state.enemy.hp, 91);
        assert_eq!(restarted.allocate_battle_id(), 10);
        assert_eq!(restarted.ongoing_for(1).await, Some(ongoing.battle_id));
        assert_eq!(restarted.ongoing_for(2).await, None);
    }
}
