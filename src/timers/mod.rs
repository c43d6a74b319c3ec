//! Draft timers
//!
//! Provides:
//! - One-shot timers keyed to a battle, with a kind and an epoch token
//! - `tick`: collect and remove due timers
//!
//! The epoch is the draft session's epoch when the timer was scheduled. The
//! draft manager ignores a fired timer whose epoch no longer matches.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::BattleId;

/// What a timer does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    /// Auto-pick for whoever is on the clock
    PickDeadline,
    /// Abandon the whole session
    DraftExpiry,
}

/// A one-shot timer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timer {
    pub id: String,
    pub battle_id: BattleId,
    pub kind: TimerKind,
    pub epoch: u64,
    /// Unix timestamp (ms) when the timer should fire
    pub fire_at: i64,
}

impl Timer {
    pub fn new(battle_id: BattleId, kind: TimerKind, epoch: u64, delay_ms: u64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            battle_id,
            kind,
            epoch,
            fire_at: now + delay_ms as i64,
        }
    }

    /// Check if timer is due to fire
    pub fn is_due(&self) -> bool {
        self.is_due_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn is_due_at(&self, now_ms: i64) -> bool {
        now_ms >= self.fire_at
    }

    /// Time remaining until fire (0 if already due)
    pub fn time_remaining_ms(&self) -> u64 {
        let now = chrono::Utc::now().timestamp_millis();
        (self.fire_at - now).max(0) as u64
    }
}

/// Result of firing a timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub battle_id: BattleId,
    pub kind: TimerKind,
    pub epoch: u64,
}

#[derive(Debug, Default)]
pub struct TimerManager {
    timers: RwLock<HashMap<String, Timer>>,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Add a one-shot timer
    pub async fn add_timer(&self, timer: Timer) -> String {
        let id = timer.id.clone();
        debug!(
            "Timer {:?} scheduled for battle {} (epoch {})",
            timer.kind, timer.battle_id, timer.epoch
        );
        self.timers.write().await.insert(id.clone(), timer);
        id
    }

    /// Remove a timer by ID
    pub async fn remove_timer(&self, timer_id: &str) -> bool {
        self.timers.write().await.remove(timer_id).is_some()
    }

    /// Remove every timer of one kind for a battle
    pub async fn remove_kind_for_battle(&self, battle_id: BattleId, kind: TimerKind) {
        self.timers
            .write()
            .await
            .retain(|_, t| !(t.battle_id == battle_id && t.kind == kind));
    }

    /// Remove all timers for a battle
    pub async fn remove_timers_for_battle(&self, battle_id: BattleId) {
        self.timers
            .write()
            .await
            .retain(|_, t| t.battle_id != battle_id);
    }

    /// Collect due timers, removing them
    pub async fn tick(&self) -> Vec<TimerFired> {
        self.tick_at(chrono::Utc::now().timestamp_millis()).await
    }

    pub async fn tick_at(&self, now_ms: i64) -> Vec<TimerFired> {
        let mut timers = self.timers.write().await;
        let due: Vec<String> = timers
            .values()
            .filter(|t| t.is_due_at(now_ms))
            .map(|t| t.id.clone())
            .collect();

        let mut fired: Vec<Timer> = due.iter().filter_map(|id| timers.remove(id)).collect();
        fired.sort_by_key(|t| t.fire_at);

        fired
            .into_iter()
            .map(|t| TimerFired {
                battle_id: t.battle_id,
                kind: t.kind,
                epoch: t.epoch,
            })
            .collect()
    }

    /// Get count of active timers
    pub async fn timer_count(&self) -> usize {
        self.timers.read().await.len()
    }

    pub async fn timers_for_battle(&self, battle_id: BattleId) -> Vec<Timer> {
        self.timers
            .read()
            .await
            .values()
            .filter(|t| t.battle_id == battle_id)
            .cloned()
            .collect()
    }
}
