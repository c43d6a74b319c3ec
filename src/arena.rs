//! Arena facade
//!
//! Transport-agnostic entry point for every game operation. Wires the match
//! queue into drafts, drafts into PvP duels, and finished duels into rating
//! settlement.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::abilities::{AbilityId, AbilityInfo, AbilityRegistry};
use crate::combat::{
    BossCatalog, DiceSource, DuelEngine, DuelSettings, DuelState, RollResult, StartDuel,
};
use crate::config::Config;
use crate::draft::{DraftManager, DraftOutcome, DraftSettings, DraftView, PickResult};
use crate::error::GameResult;
use crate::events::{EventHub, GameEvent};
use crate::matchmaking::{Admission, MatchQueue, Pairing, WindowPolicy};
use crate::rating::{RatingBook, RatingCalculator, RatingChange};
use crate::timers::TimerManager;
use crate::{BattleId, PlayerId};

/// Result of joining the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnqueueOutcome {
    Queued { player_id: PlayerId, rating: i32 },
    /// The player already has a live draft or duel
    Reconnect { battle_id: BattleId },
}

/// A successful pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchFound {
    pub battle_id: BattleId,
    pub opponent_id: PlayerId,
}

pub struct Arena {
    registry: Arc<AbilityRegistry>,
    events: Arc<EventHub>,
    timers: Arc<TimerManager>,
    queue: Arc<MatchQueue>,
    drafts: Arc<DraftManager>,
    engine: Arc<DuelEngine>,
    ratings: Arc<RatingBook>,
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("queued", &self.queue.len())
            .field("drafts", &self.drafts)
            .field("engine", &self.engine)
            .finish()
    }
}

impl Arena {
    pub fn new(config: &Config, dice: Arc<dyn DiceSource>, pool: Option<SqlitePool>) -> Self {
        let registry = Arc::new(AbilityRegistry::builtin());
        let events = EventHub::shared();
        let timers = TimerManager::shared();

        let queue = MatchQueue::shared(WindowPolicy::from(&config.matchmaking));
        let drafts = Arc::new(DraftManager::new(
            registry.clone(),
            timers.clone(),
            events.clone(),
            dice.clone(),
            DraftSettings::from(&config.game),
            pool.clone(),
        ));
        let engine = Arc::new(DuelEngine::new(
            registry.clone(),
            BossCatalog::builtin(),
            dice,
            events.clone(),
            DuelSettings::from(&config.game),
            pool.clone(),
        ));
        let ratings = RatingBook::shared(
            RatingCalculator::new(config.game.k_factor),
            config.game.default_rating,
            pool,
        );

        Self {
            registry,
            events,
            timers,
            queue,
            drafts,
            engine,
            ratings,
        }
    }

    pub fn shared(config: &Config, dice: Arc<dyn DiceSource>, pool: Option<SqlitePool>) -> Arc<Self> {
        Arc::new(Self::new(config, dice, pool))
    }

    pub fn events(&self) -> &Arc<EventHub> {
        &self.events
    }

    pub fn engine(&self) -> &Arc<DuelEngine> {
        &self.engine
    }

    pub fn drafts(&self) -> &Arc<DraftManager> {
        &self.drafts
    }

    pub fn queue(&self) -> &Arc<MatchQueue> {
        &self.queue
    }

    pub fn ratings(&self) -> &Arc<RatingBook> {
        &self.ratings
    }

    pub fn timers(&self) -> &Arc<TimerManager> {
        &self.timers
    }

    /// Reload persisted duels
    pub async fn restore(&self) -> GameResult<usize> {
        self.engine.restore().await
    }

    /// Join the matchmaking queue
    ///
    /// A player who is still drafting or dueling, or whose match is being
    /// set up, gets their battle back instead of a ticket. Without an
    /// explicit rating the stored one is used.
    pub async fn enqueue(&self, player_id: PlayerId, rating: Option<i32>) -> GameResult<EnqueueOutcome> {
        if let Some(battle_id) = self.drafts.active_for(player_id).await {
            return Ok(EnqueueOutcome::Reconnect { battle_id });
        }
        if let Some(battle_id) = self.engine.ongoing_for(player_id).await {
            return Ok(EnqueueOutcome::Reconnect { battle_id });
        }

        let rating = match rating {
            Some(rating) => rating,
            None => self.ratings.get(player_id).await,
        };
        let mut admission = self.queue.enqueue(player_id, rating)?;
        if let Admission::Reserved {
            battle_id,
            placed: true,
        } = admission
        {
            if !self.is_live(battle_id).await {
                self.queue.release(player_id, battle_id);
                admission = self.queue.enqueue(player_id, rating)?;
            }
        }

        match admission {
            Admission::Queued(ticket) => {
                info!("Player {} queued at rating {}", player_id, ticket.rating);
                Ok(EnqueueOutcome::Queued {
                    player_id,
                    rating: ticket.rating,
                })
            }
            Admission::Reserved { battle_id, .. } => Ok(EnqueueOutcome::Reconnect { battle_id }),
        }
    }

    /// Whether a battle is still drafting or dueling
    async fn is_live(&self, battle_id: BattleId) -> bool {
        if let Ok(draft) = self.drafts.get(battle_id).await {
            return draft.expires_at > Utc::now();
        }
        self.engine
            .get_status(battle_id)
            .await
            .is_ok_and(|duel| !duel.status.is_terminal())
    }

    pub fn leave(&self, player_id: PlayerId) -> bool {
        self.queue.leave(player_id)
    }

    /// Pair a queued player and open the draft
    ///
    /// Both players stay reserved in the queue from the pairing on, so a
    /// re-enqueue while the draft is being opened reconnects them.
    pub async fn try_match(&self, player_id: PlayerId) -> GameResult<Option<MatchFound>> {
        let engine = &self.engine;
        let Some(Pairing {
            battle_id,
            opponent_id,
        }) = self
            .queue
            .find_opponent(player_id, || engine.allocate_battle_id())?
        else {
            return Ok(None);
        };

        info!(
            "Matched player {} with player {} (battle {})",
            player_id, opponent_id, battle_id
        );
        self.events.publish(
            player_id,
            GameEvent::MatchFound {
                battle_id,
                opponent_id,
            },
        );
        self.events.publish(
            opponent_id,
            GameEvent::MatchFound {
                battle_id,
                opponent_id: player_id,
            },
        );

        if let Err(e) = self.drafts.initialize(battle_id, player_id, opponent_id).await {
            self.queue.release(player_id, battle_id);
            self.queue.release(opponent_id, battle_id);
            return Err(e);
        }
        self.queue.place(player_id, battle_id);
        self.queue.place(opponent_id, battle_id);

        Ok(Some(MatchFound {
            battle_id,
            opponent_id,
        }))
    }

    pub async fn init_draft(
        &self,
        battle_id: BattleId,
        player1: PlayerId,
        player2: PlayerId,
    ) -> GameResult<DraftView> {
        self.engine.claim_battle_id(battle_id).await?;
        self.drafts.initialize(battle_id, player1, player2).await
    }

    pub async fn get_draft(&self, battle_id: BattleId) -> GameResult<DraftView> {
        self.drafts.get(battle_id).await
    }

    pub async fn pick(
        &self,
        battle_id: BattleId,
        player_id: PlayerId,
        ability_id: AbilityId,
    ) -> GameResult<PickResult> {
        self.drafts.pick(battle_id, player_id, ability_id).await
    }

    pub async fn set_ready(&self, battle_id: BattleId, player_id: PlayerId) -> GameResult<bool> {
        self.drafts.set_ready(battle_id, player_id).await
    }

    /// Close the draft and open the PvP duel under the same battle id
    ///
    /// The first drafter takes the PLAYER seat. The draft is only closed
    /// once the duel exists; if the duel cannot be opened the draft stays.
    pub async fn finalize_draft(&self, battle_id: BattleId) -> GameResult<DraftOutcome> {
        let engine = &self.engine;
        self.drafts
            .finalize(battle_id, |outcome| async move {
                engine
                    .start_duel(StartDuel {
                        player_id: outcome.player1_id,
                        abilities: outcome.player1_abilities,
                        opponent_id: Some(outcome.player2_id),
                        enemy_abilities: outcome.player2_abilities,
                        battle_id: Some(outcome.battle_id),
                        ..Default::default()
                    })
                    .await
                    .map(|_| ())
            })
            .await
    }

    pub async fn start_duel(&self, req: StartDuel) -> GameResult<DuelState> {
        self.engine.start_duel(req).await
    }

    /// Roll for the caller; a duel that ends here is settled and announced
    pub async fn roll_dice(&self, battle_id: BattleId, player_id: PlayerId) -> GameResult<RollResult> {
        let result = self.engine.roll_dice(battle_id, player_id).await?;
        if result.status.is_terminal() {
            self.conclude(battle_id).await?;
        }
        Ok(result)
    }

    async fn conclude(&self, battle_id: BattleId) -> GameResult<Option<RatingChange>> {
        let rating = match self.engine.claim_settlement(battle_id).await? {
            Some(claim) => Some(
                self.ratings
                    .settle(claim.player_id, claim.opponent_id, claim.outcome)
                    .await,
            ),
            None => None,
        };

        let duel = self.engine.get_status(battle_id).await?;
        self.events.publish_all(
            &duel.participants(),
            &GameEvent::BattleEnd {
                battle_id,
                status: duel.status,
                rating: rating.clone(),
            },
        );
        Ok(rating)
    }

    pub async fn get_status(&self, battle_id: BattleId) -> GameResult<DuelState> {
        self.engine.get_status(battle_id).await
    }

    pub async fn rating(&self, player_id: PlayerId) -> i32 {
        self.ratings.get(player_id).await
    }

    pub fn abilities(&self) -> Vec<AbilityInfo> {
        self.registry.catalog()
    }

    /// Fire due timers; returns how many fired
    pub async fn tick_timers(&self) -> usize {
        let fired = self.timers.tick().await;
        for timer in &fired {
            self.drafts.handle_timer(timer).await;
        }
        fired.len()
    }

    /// Background timer loop, stopped by the shutdown signal
    pub fn spawn_timer_loop(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let fired = self.tick_timers().await;
                        if fired > 0 {
                            debug!("Fired {} timers", fired);
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Timer loop stopped");
        })
    }
}
