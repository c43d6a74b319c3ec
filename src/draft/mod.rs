//! Snake draft
//!
//! Two players pick abilities from the shared catalog in the order
//! A,B,B,A,A,B,B,A. Each session is guarded by its own mutex; every accepted
//! pick bumps the session epoch so pick-deadline timers scheduled for an
//! older pick are ignored.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::abilities::{AbilityId, AbilityRegistry};
use crate::combat::DiceSource;
use crate::config::GameConfig;
use crate::db::AbilityList;
use crate::error::{GameError, GameResult};
use crate::events::{EventHub, GameEvent};
use crate::timers::{Timer, TimerFired, TimerKind, TimerManager};
use crate::{BattleId, PlayerId};

/// Picks per draft (four per side)
pub const TOTAL_PICKS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Seat {
    A,
    B,
}

/// Owner of a 1-based pick number, `None` outside `1..=8`
pub fn turn_for(pick: u32) -> Option<Seat> {
    if !(1..=TOTAL_PICKS).contains(&pick) {
        return None;
    }
    // A,B | B,A | A,B | B,A
    match pick % 4 {
        1 | 0 => Some(Seat::A),
        _ => Some(Seat::B),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DraftStatus {
    InProgress,
    PicksComplete,
    Completed,
    Cancelled,
    Expired,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::InProgress => "IN_PROGRESS",
            DraftStatus::PicksComplete => "PICKS_COMPLETE",
            DraftStatus::Completed => "COMPLETED",
            DraftStatus::Cancelled => "CANCELLED",
            DraftStatus::Expired => "EXPIRED",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DraftSettings {
    pub pick_timeout: Duration,
    pub ttl: Duration,
}

impl Default for DraftSettings {
    fn default() -> Self {
        Self {
            pick_timeout: Duration::from_secs(30),
            ttl: Duration::from_secs(600),
        }
    }
}

impl From<&GameConfig> for DraftSettings {
    fn from(cfg: &GameConfig) -> Self {
        Self {
            pick_timeout: Duration::from_secs(cfg.pick_timeout_secs),
            ttl: Duration::from_secs(cfg.draft_ttl_secs),
        }
    }
}

fn to_delta(d: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(d.as_millis() as i64)
}

/// Mutable session
#[derive(Debug, Clone)]
struct DraftSession {
    battle_id: BattleId,
    player1: PlayerId,
    player2: PlayerId,
    pool: Vec<AbilityId>,
    player1_picks: Vec<AbilityId>,
    player2_picks: Vec<AbilityId>,
    pick_number: u32,
    status: DraftStatus,
    epoch: u64,
    pick_deadline: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    player1_ready: bool,
    player2_ready: bool,
}

impl DraftSession {
    fn seat_of(&self, player_id: PlayerId) -> Option<Seat> {
        if player_id == self.player1 {
            Some(Seat::A)
        } else if player_id == self.player2 {
            Some(Seat::B)
        } else {
            None
        }
    }

    fn player(&self, seat: Seat) -> PlayerId {
        match seat {
            Seat::A => self.player1,
            Seat::B => self.player2,
        }
    }

    fn current_turn(&self) -> Option<Seat> {
        match self.status {
            DraftStatus::InProgress => turn_for(self.pick_number),
            _ => None,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn view(&self) -> DraftView {
        DraftView {
            battle_id: self.battle_id,
            player1_id: self.player1,
            player2_id: self.player2,
            pool: self.pool.clone(),
            player1_picks: self.player1_picks.clone(),
            player2_picks: self.player2_picks.clone(),
            pick_number: self.pick_number,
            current_turn: self.current_turn().map(|s| self.player(s)),
            status: self.status,
            epoch: self.epoch,
            pick_deadline: self.pick_deadline,
            expires_at: self.expires_at,
            player1_ready: self.player1_ready,
            player2_ready: self.player2_ready,
        }
    }
}

/// Read-only snapshot of a draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftView {
    pub battle_id: BattleId,
    pub player1_id: PlayerId,
    pub player2_id: PlayerId,
    pub pool: Vec<AbilityId>,
    pub player1_picks: Vec<AbilityId>,
    pub player2_picks: Vec<AbilityId>,
    pub pick_number: u32,
    /// Player on the clock
    pub current_turn: Option<PlayerId>,
    pub status: DraftStatus,
    pub epoch: u64,
    pub pick_deadline: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub player1_ready: bool,
    pub player2_ready: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickResult {
    pub success: bool,
    pub ability_id: AbilityId,
    pub picked_by: PlayerId,
    /// Chosen by the deadline path rather than the player
    pub auto_picked: bool,
    pub next_turn: Option<PlayerId>,
    pub status: DraftStatus,
}

/// Final pick lists handed to the duel engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftOutcome {
    pub battle_id: BattleId,
    pub player1_id: PlayerId,
    pub player2_id: PlayerId,
    pub player1_abilities: Vec<AbilityId>,
    pub player2_abilities: Vec<AbilityId>,
}

/// All live draft sessions
pub struct DraftManager {
    sessions: RwLock<HashMap<BattleId, Arc<Mutex<DraftSession>>>>,
    registry: Arc<AbilityRegistry>,
    timers: Arc<TimerManager>,
    events: Arc<EventHub>,
    dice: Arc<dyn DiceSource>,
    settings: DraftSettings,
    pool: Option<SqlitePool>,
}

impl std::fmt::Debug for DraftManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftManager")
            .field("settings", &self.settings)
            .field("pool", &self.pool.is_some())
            .finish()
    }
}

impl DraftManager {
    pub fn new(
        registry: Arc<AbilityRegistry>,
        timers: Arc<TimerManager>,
        events: Arc<EventHub>,
        dice: Arc<dyn DiceSource>,
        settings: DraftSettings,
        pool: Option<SqlitePool>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            registry,
            timers,
            events,
            dice,
            settings,
            pool,
        }
    }

    async fn session(&self, battle_id: BattleId) -> GameResult<Arc<Mutex<DraftSession>>> {
        self.sessions
            .read()
            .await
            .get(&battle_id)
            .cloned()
            .ok_or_else(|| GameError::not_found(format!("draft {}", battle_id)))
    }

    /// Open a draft with the full catalog as the pool
    pub async fn initialize(
        &self,
        battle_id: BattleId,
        player1: PlayerId,
        player2: PlayerId,
    ) -> GameResult<DraftView> {
        if player1 == player2 {
            return Err(GameError::validation("a player cannot draft against themselves"));
        }
        let pool = self.registry.ids();
        if pool.len() < TOTAL_PICKS as usize {
            return Err(GameError::invalid_state(format!(
                "catalog holds {} abilities, a draft needs {}",
                pool.len(),
                TOTAL_PICKS
            )));
        }

        let now = Utc::now();
        let session = DraftSession {
            battle_id,
            player1,
            player2,
            pool,
            player1_picks: Vec::new(),
            player2_picks: Vec::new(),
            pick_number: 1,
            status: DraftStatus::InProgress,
            epoch: 1,
            pick_deadline: now + to_delta(self.settings.pick_timeout),
            expires_at: now + to_delta(self.settings.ttl),
            player1_ready: false,
            player2_ready: false,
        };

        let slot = Arc::new(Mutex::new(session));
        let guard = slot.lock().await;
        {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(&battle_id) {
                return Err(GameError::conflict(format!(
                    "draft {} already exists",
                    battle_id
                )));
            }
            sessions.insert(battle_id, slot.clone());
        }

        self.schedule_pick_deadline(&guard).await;
        self.timers
            .add_timer(Timer::new(
                battle_id,
                TimerKind::DraftExpiry,
                0,
                self.settings.ttl.as_millis() as u64,
            ))
            .await;
        self.persist(&guard).await;

        let view = guard.view();
        self.publish_state(&guard);
        info!(
            "Draft {} started: player {} vs player {}",
            battle_id, player1, player2
        );
        Ok(view)
    }

    /// Explicit pick by the player on the clock
    pub async fn pick(
        &self,
        battle_id: BattleId,
        player_id: PlayerId,
        ability_id: AbilityId,
    ) -> GameResult<PickResult> {
        let slot = self.session(battle_id).await?;
        let mut session = slot.lock().await;

        self.ensure_open(&session)?;

        let seat = session
            .seat_of(player_id)
            .ok_or_else(|| GameError::not_found(format!("player {} in draft {}", player_id, battle_id)))?;
        if session.current_turn() != Some(seat) {
            return Err(GameError::invalid_state(format!(
                "not player {}'s turn (pick {})",
                player_id, session.pick_number
            )));
        }
        if !self.registry.contains(ability_id) {
            return Err(GameError::not_found(format!("ability {}", ability_id)));
        }
        if !session.pool.contains(&ability_id) {
            return Err(GameError::conflict(format!(
                "ability {} was already picked",
                ability_id
            )));
        }

        Ok(self.apply_pick(&mut session, seat, ability_id, false).await)
    }

    /// Deadline path: random pick for whoever is on the clock
    ///
    /// `epoch` must match the session; a stale timer gets `Conflict`.
    pub async fn timeout(&self, battle_id: BattleId, epoch: u64) -> GameResult<PickResult> {
        let slot = self.session(battle_id).await?;
        let mut session = slot.lock().await;

        if session.epoch != epoch {
            return Err(GameError::conflict(format!(
                "stale pick timer for draft {} (epoch {} != {})",
                battle_id, epoch, session.epoch
            )));
        }
        self.ensure_open(&session)?;

        let seat = session
            .current_turn()
            .ok_or_else(|| GameError::invalid_state("no pick is pending"))?;
        if session.pool.is_empty() {
            return Err(GameError::invalid_state("draft pool is empty"));
        }
        let ability_id = session.pool[self.dice.index(session.pool.len())];

        let result = self.apply_pick(&mut session, seat, ability_id, true).await;
        info!(
            "Draft {} pick timed out, auto-picked {} for player {}",
            battle_id, ability_id, result.picked_by
        );
        Ok(result)
    }

    /// Mark a player ready; returns true once both sides are ready
    pub async fn set_ready(&self, battle_id: BattleId, player_id: PlayerId) -> GameResult<bool> {
        let slot = self.session(battle_id).await?;
        let mut session = slot.lock().await;

        let seat = session
            .seat_of(player_id)
            .ok_or_else(|| GameError::not_found(format!("player {} in draft {}", player_id, battle_id)))?;

        match session.status {
            DraftStatus::PicksComplete => {}
            DraftStatus::Completed => return Ok(true),
            other => {
                return Err(GameError::invalid_state(format!(
                    "draft {} is {}, picks are not complete",
                    battle_id,
                    other.as_str()
                )))
            }
        }

        match seat {
            Seat::A => session.player1_ready = true,
            Seat::B => session.player2_ready = true,
        }

        let complete = session.player1_ready && session.player2_ready;
        if complete {
            session.status = DraftStatus::Completed;
            info!("Draft {} completed, both players ready", battle_id);
        }
        self.publish_state(&session);
        Ok(complete)
    }

    /// Close a completed draft once `hand_off` accepts both pick lists
    ///
    /// The session stays locked through the hand-off and is only removed
    /// when it succeeds; a failed hand-off leaves the draft COMPLETED.
    pub async fn finalize<F, Fut>(&self, battle_id: BattleId, hand_off: F) -> GameResult<DraftOutcome>
    where
        F: FnOnce(DraftOutcome) -> Fut,
        Fut: Future<Output = GameResult<()>>,
    {
        let slot = self.session(battle_id).await?;
        let session = slot.lock().await;

        let current = self
            .sessions
            .read()
            .await
            .get(&battle_id)
            .is_some_and(|live| Arc::ptr_eq(live, &slot));
        if !current {
            return Err(GameError::not_found(format!("draft {}", battle_id)));
        }
        if session.status != DraftStatus::Completed {
            return Err(GameError::invalid_state(format!(
                "draft {} is {}, not COMPLETED",
                battle_id,
                session.status.as_str()
            )));
        }

        let outcome = DraftOutcome {
            battle_id,
            player1_id: session.player1,
            player2_id: session.player2,
            player1_abilities: session.player1_picks.clone(),
            player2_abilities: session.player2_picks.clone(),
        };
        if let Err(e) = hand_off(outcome.clone()).await {
            warn!("Draft {} hand-off failed, keeping session: {}", battle_id, e);
            return Err(e);
        }

        self.sessions.write().await.remove(&battle_id);
        self.timers.remove_timers_for_battle(battle_id).await;
        self.persist(&session).await;

        self.events.publish_all(
            &[session.player1, session.player2],
            &GameEvent::DraftComplete {
                battle_id,
                player1_abilities: outcome.player1_abilities.clone(),
                player2_abilities: outcome.player2_abilities.clone(),
            },
        );
        info!("Draft {} finalized", battle_id);
        Ok(outcome)
    }

    /// Abandon a draft
    pub async fn cancel(&self, battle_id: BattleId) -> GameResult<()> {
        self.close(battle_id, DraftStatus::Cancelled).await
    }

    /// Route a fired timer; stale or orphaned timers are dropped
    pub async fn handle_timer(&self, fired: &TimerFired) {
        let result = match fired.kind {
            TimerKind::PickDeadline => self.timeout(fired.battle_id, fired.epoch).await.map(|_| ()),
            TimerKind::DraftExpiry => self.close(fired.battle_id, DraftStatus::Expired).await,
        };
        match result {
            Ok(()) => {}
            Err(GameError::Conflict(msg)) | Err(GameError::NotFound(msg)) => {
                debug!("Ignoring timer {:?}: {}", fired.kind, msg)
            }
            Err(e) => debug!("Timer {:?} for draft {}: {}", fired.kind, fired.battle_id, e),
        }
    }

    pub async fn get(&self, battle_id: BattleId) -> GameResult<DraftView> {
        let slot = self.session(battle_id).await?;
        let session = slot.lock().await;
        Ok(session.view())
    }

    /// Live draft a player is part of
    pub async fn active_for(&self, player_id: PlayerId) -> Option<BattleId> {
        let slots: Vec<Arc<Mutex<DraftSession>>> =
            self.sessions.read().await.values().cloned().collect();
        for slot in slots {
            let session = slot.lock().await;
            if session.seat_of(player_id).is_some() && !session.is_expired(Utc::now()) {
                return Some(session.battle_id);
            }
        }
        None
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn ensure_open(&self, session: &DraftSession) -> GameResult<()> {
        if session.is_expired(Utc::now()) {
            return Err(GameError::Timeout(format!(
                "draft {} expired",
                session.battle_id
            )));
        }
        if session.status != DraftStatus::InProgress {
            return Err(GameError::invalid_state(format!(
                "draft {} is {}",
                session.battle_id,
                session.status.as_str()
            )));
        }
        Ok(())
    }

    async fn apply_pick(
        &self,
        session: &mut DraftSession,
        seat: Seat,
        ability_id: AbilityId,
        auto_picked: bool,
    ) -> PickResult {
        session.pool.retain(|id| *id != ability_id);
        match seat {
            Seat::A => session.player1_picks.push(ability_id),
            Seat::B => session.player2_picks.push(ability_id),
        }
        let picked_by = session.player(seat);
        session.pick_number += 1;
        session.epoch += 1;

        self.timers
            .remove_kind_for_battle(session.battle_id, TimerKind::PickDeadline)
            .await;

        if session.pick_number > TOTAL_PICKS {
            session.status = DraftStatus::PicksComplete;
            info!("Draft {} picks complete", session.battle_id);
        } else {
            session.pick_deadline = Utc::now() + to_delta(self.settings.pick_timeout);
            self.schedule_pick_deadline(session).await;
        }

        debug!(
            "Draft {} pick {}: player {} took {}",
            session.battle_id,
            session.pick_number - 1,
            picked_by,
            ability_id
        );

        self.publish_state(session);
        if session.status == DraftStatus::PicksComplete {
            self.events.publish_all(
                &[session.player1, session.player2],
                &GameEvent::DraftPicksComplete {
                    battle_id: session.battle_id,
                },
            );
        }

        PickResult {
            success: true,
            ability_id,
            picked_by,
            auto_picked,
            next_turn: session.current_turn().map(|s| session.player(s)),
            status: session.status,
        }
    }

    async fn schedule_pick_deadline(&self, session: &DraftSession) {
        self.timers
            .add_timer(Timer::new(
                session.battle_id,
                TimerKind::PickDeadline,
                session.epoch,
                self.settings.pick_timeout.as_millis() as u64,
            ))
            .await;
    }

    async fn close(&self, battle_id: BattleId, status: DraftStatus) -> GameResult<()> {
        let slot = self.session(battle_id).await?;
        let mut session = slot.lock().await;

        if self.sessions.write().await.remove(&battle_id).is_none() {
            return Err(GameError::not_found(format!("draft {}", battle_id)));
        }
        session.status = status;
        session.epoch += 1;
        self.timers.remove_timers_for_battle(battle_id).await;
        self.persist(&session).await;
        self.publish_state(&session);

        info!("Draft {} closed as {}", battle_id, status.as_str());
        Ok(())
    }

    fn publish_state(&self, session: &DraftSession) {
        self.events.publish_all(
            &[session.player1, session.player2],
            &GameEvent::DraftState(session.view()),
        );
    }

    async fn persist(&self, session: &DraftSession) {
        let Some(ref pool) = self.pool else {
            return;
        };
        let (p1, p2) = match (
            AbilityList::encode(&session.player1_picks),
            AbilityList::encode(&session.player2_picks),
        ) {
            (Ok(p1), Ok(p2)) => (p1, p2),
            _ => {
                warn!("Failed to encode picks for draft {}", session.battle_id);
                return;
            }
        };

        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO drafts
                (battle_id, player1_id, player2_id, status, player1_picks, player2_picks, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, datetime('now'))
            "#,
        )
        .bind(session.battle_id)
        .bind(session.player1)
        .bind(session.player2)
        .bind(session.status.as_str())
        .bind(p1)
        .bind(p2)
        .execute(pool)
        .await;

        if let Err(e) = result {
            warn!("Failed to persist draft {}: {}", session.battle_id, e);
        }
    }
}
