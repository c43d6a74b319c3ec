//! Push events
//!
//! Every connected player owns one bounded channel. Publishing never blocks:
//! a full channel drops the event, a closed channel drops the subscriber.
//! Callers publish battle events while holding that battle's lock, so one
//! recipient sees one battle's events in order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::abilities::AbilityId;
use crate::combat::{Actor, DuelStatus, RollResult};
use crate::draft::DraftView;
use crate::rating::RatingChange;
use crate::{BattleId, PlayerId};

/// Default per-recipient queue depth
pub const DEFAULT_CAPACITY: usize = 64;

/// Server-to-client event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    MatchFound {
        battle_id: BattleId,
        opponent_id: PlayerId,
    },
    DraftState(DraftView),
    DraftPicksComplete {
        battle_id: BattleId,
    },
    DraftComplete {
        battle_id: BattleId,
        player1_abilities: Vec<AbilityId>,
        player2_abilities: Vec<AbilityId>,
    },
    DiceResult(RollResult),
    TurnStart {
        battle_id: BattleId,
        turn: u32,
        actor: Actor,
        player_id: Option<PlayerId>,
    },
    BattleEnd {
        battle_id: BattleId,
        status: DuelStatus,
        rating: Option<RatingChange>,
    },
}

impl GameEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::MatchFound { .. } => "match_found",
            GameEvent::DraftState(_) => "draft_state",
            GameEvent::DraftPicksComplete { .. } => "draft_picks_complete",
            GameEvent::DraftComplete { .. } => "draft_complete",
            GameEvent::DiceResult(_) => "dice_result",
            GameEvent::TurnStart { .. } => "turn_start",
            GameEvent::BattleEnd { .. } => "battle_end",
        }
    }
}

/// Per-player event fan-out
#[derive(Debug)]
pub struct EventHub {
    subscribers: RwLock<HashMap<PlayerId, mpsc::Sender<GameEvent>>>,
    capacity: usize,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a stream for a player, replacing any previous one
    pub fn subscribe(&self, player_id: PlayerId) -> mpsc::Receiver<GameEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        if self.subscribers.write().insert(player_id, tx).is_some() {
            debug!("Player {} re-subscribed, previous stream closed", player_id);
        }
        rx
    }

    /// Forget a player's stream once its receiver is gone
    ///
    /// A newer stream from a reconnect is left alone.
    pub fn release(&self, player_id: PlayerId) {
        let mut subs = self.subscribers.write();
        if subs.get(&player_id).is_some_and(|s| s.is_closed()) {
            subs.remove(&player_id);
        }
    }

    pub fn is_subscribed(&self, player_id: PlayerId) -> bool {
        self.subscribers.read().contains_key(&player_id)
    }

    /// Deliver one event; returns whether it was queued
    pub fn publish(&self, player_id: PlayerId, event: GameEvent) -> bool {
        let Some(sender) = self.subscribers.read().get(&player_id).cloned() else {
            return false;
        };

        match sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    "Event queue full for player {}, dropping {}",
                    player_id,
                    event.name()
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                let mut subs = self.subscribers.write();
                if subs.get(&player_id).is_some_and(|s| s.same_channel(&sender)) {
                    subs.remove(&player_id);
                }
                false
            }
        }
    }

    /// Deliver the same event to several players
    pub fn publish_all(&self, players: &[PlayerId], event: &GameEvent) {
        for player_id in players {
            self.publish(*player_id, event.clone());
        }
    }
}
