//! Rating-ordered match queue
//!
//! Tickets are kept in a `BTreeMap` ordered by (rating, arrival). Finding an
//! opponent scans the caller's acceptance window and removes both tickets in
//! one critical section, so a ticket can never be matched twice.
//!
//! The same critical section reserves both players under the new battle id.
//! A reserved player cannot queue again; enqueue reports the reservation
//! until the caller releases it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MatchmakingConfig;
use crate::error::{GameError, GameResult};
use crate::{BattleId, PlayerId};

/// How the acceptance window widens with waiting time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub initial_range: i32,
    pub range_step: i32,
    pub step: Duration,
    pub unbounded_after: Duration,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            initial_range: 150,
            range_step: 50,
            step: Duration::from_secs(30),
            unbounded_after: Duration::from_secs(180),
        }
    }
}

impl From<&MatchmakingConfig> for WindowPolicy {
    fn from(cfg: &MatchmakingConfig) -> Self {
        Self {
            initial_range: cfg.initial_range,
            range_step: cfg.range_step,
            step: Duration::from_secs(cfg.step_secs.max(1)),
            unbounded_after: Duration::from_secs(cfg.unbounded_after_secs),
        }
    }
}

impl WindowPolicy {
    /// Half-width of the window after `waited`; `None` means any rating
    pub fn range(&self, waited: Duration) -> Option<i32> {
        if waited >= self.unbounded_after {
            return None;
        }
        let steps = (waited.as_secs() / self.step.as_secs().max(1)) as i32;
        Some(self.initial_range + self.range_step * steps)
    }
}

/// A waiting player
#[derive(Debug, Clone, Serialize)]
pub struct MatchTicket {
    pub player_id: PlayerId,
    pub rating: i32,
    #[serde(skip)]
    pub enqueued_at: Instant,
    #[serde(skip)]
    seq: u64,
}

/// Both sides of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    pub battle_id: BattleId,
    pub opponent_id: PlayerId,
}

/// Result of `enqueue`
#[derive(Debug, Clone)]
pub enum Admission {
    Queued(MatchTicket),
    /// Already matched; `placed` once the battle has been opened
    Reserved { battle_id: BattleId, placed: bool },
}

#[derive(Debug, Clone, Copy)]
struct Reservation {
    battle_id: BattleId,
    placed: bool,
}

#[derive(Debug, Default)]
struct QueueInner {
    by_rating: BTreeMap<(i32, u64), PlayerId>,
    tickets: HashMap<PlayerId, MatchTicket>,
    reserved: HashMap<PlayerId, Reservation>,
    next_seq: u64,
}

impl QueueInner {
    fn remove(&mut self, player_id: PlayerId) -> Option<MatchTicket> {
        let ticket = self.tickets.remove(&player_id)?;
        self.by_rating.remove(&(ticket.rating, ticket.seq));
        Some(ticket)
    }
}

#[derive(Debug)]
pub struct MatchQueue {
    inner: Mutex<QueueInner>,
    policy: WindowPolicy,
}

impl Default for MatchQueue {
    fn default() -> Self {
        Self::new(WindowPolicy::default())
    }
}

impl MatchQueue {
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            policy,
        }
    }

    pub fn shared(policy: WindowPolicy) -> Arc<Self> {
        Arc::new(Self::new(policy))
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }

    /// Add a ticket; a player may hold only one
    pub fn enqueue(&self, player_id: PlayerId, rating: i32) -> GameResult<Admission> {
        self.enqueue_at(player_id, rating, Instant::now())
    }

    pub fn enqueue_at(
        &self,
        player_id: PlayerId,
        rating: i32,
        now: Instant,
    ) -> GameResult<Admission> {
        let mut inner = self.inner.lock();
        if let Some(r) = inner.reserved.get(&player_id) {
            return Ok(Admission::Reserved {
                battle_id: r.battle_id,
                placed: r.placed,
            });
        }
        if inner.tickets.contains_key(&player_id) {
            return Err(GameError::conflict(format!(
                "player {} is already queued",
                player_id
            )));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let ticket = MatchTicket {
            player_id,
            rating,
            enqueued_at: now,
            seq,
        };
        inner.by_rating.insert((rating, seq), player_id);
        inner.tickets.insert(player_id, ticket.clone());

        debug!("Player {} queued at rating {}", player_id, rating);
        Ok(Admission::Queued(ticket))
    }

    /// Try to pair the caller with a waiting opponent
    ///
    /// On a match both tickets are removed and both players are reserved
    /// under the id from `allocate`. With no candidate in the window the
    /// queue is left untouched.
    pub fn find_opponent(
        &self,
        player_id: PlayerId,
        allocate: impl FnOnce() -> BattleId,
    ) -> GameResult<Option<Pairing>> {
        self.find_opponent_at(player_id, Instant::now(), allocate)
    }

    pub fn find_opponent_at(
        &self,
        player_id: PlayerId,
        now: Instant,
        allocate: impl FnOnce() -> BattleId,
    ) -> GameResult<Option<Pairing>> {
        let mut inner = self.inner.lock();
        let ticket = inner
            .tickets
            .get(&player_id)
            .cloned()
            .ok_or_else(|| GameError::not_found(format!("ticket for player {}", player_id)))?;

        let waited = now.saturating_duration_since(ticket.enqueued_at);
        let (lo, hi) = match self.policy.range(waited) {
            Some(range) => (
                ticket.rating.saturating_sub(range),
                ticket.rating.saturating_add(range),
            ),
            None => (i32::MIN, i32::MAX),
        };

        let opponent = inner
            .by_rating
            .range((lo, 0)..=(hi, u64::MAX))
            .map(|(_, id)| *id)
            .find(|id| *id != player_id);

        let Some(opponent) = opponent else {
            return Ok(None);
        };

        inner.remove(player_id);
        inner.remove(opponent);
        let battle_id = allocate();
        let reservation = Reservation {
            battle_id,
            placed: false,
        };
        inner.reserved.insert(player_id, reservation);
        inner.reserved.insert(opponent, reservation);

        info!(
            "Matched player {} with player {} (window {}..={}, battle {})",
            player_id, opponent, lo, hi, battle_id
        );
        Ok(Some(Pairing {
            battle_id,
            opponent_id: opponent,
        }))
    }

    /// Mark a reservation's battle as opened
    pub fn place(&self, player_id: PlayerId, battle_id: BattleId) {
        if let Some(r) = self.inner.lock().reserved.get_mut(&player_id) {
            if r.battle_id == battle_id {
                r.placed = true;
            }
        }
    }

    /// Drop a reservation for `battle_id`; returns whether one was held
    pub fn release(&self, player_id: PlayerId, battle_id: BattleId) -> bool {
        let mut inner = self.inner.lock();
        match inner.reserved.get(&player_id) {
            Some(r) if r.battle_id == battle_id => {
                inner.reserved.remove(&player_id);
                debug!("Released player {} from battle {}", player_id, battle_id);
                true
            }
            _ => false,
        }
    }

    /// Drop a ticket; returns whether one existed
    pub fn leave(&self, player_id: PlayerId) -> bool {
        let removed = self.inner.lock().remove(player_id).is_some();
        if removed {
            debug!("Player {} left the queue", player_id);
        }
        removed
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.inner.lock().tickets.contains_key(&player_id)
    }

    pub fn ticket(&self, player_id: PlayerId) -> Option<MatchTicket> {
        self.inner.lock().tickets.get(&player_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
