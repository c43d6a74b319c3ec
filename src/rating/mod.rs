//! Elo ratings
//!
//! - `RatingCalculator`: expected score and rounded delta for a K-factor
//! - `RatingBook`: per-player ratings, in memory with SQLite write-through

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::PlayerId;

pub const DEFAULT_K_FACTOR: f64 = 32.0;
pub const DEFAULT_RATING: i32 = 1000;

/// Result from one side's point of view
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Win,
    Draw,
    Loss,
}

impl Outcome {
    pub fn score(&self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Draw => 0.5,
            Outcome::Loss => 0.0,
        }
    }

    pub fn from_score(score: f64) -> Self {
        if score >= 1.0 {
            Outcome::Win
        } else if score <= 0.0 {
            Outcome::Loss
        } else {
            Outcome::Draw
        }
    }

    pub fn reversed(&self) -> Self {
        match self {
            Outcome::Win => Outcome::Loss,
            Outcome::Draw => Outcome::Draw,
            Outcome::Loss => Outcome::Win,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RatingCalculator {
    k: f64,
}

impl Default for RatingCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_K_FACTOR)
    }
}

impl RatingCalculator {
    pub fn new(k: f64) -> Self {
        Self { k }
    }

    /// Probability that `a` beats `b`
    pub fn expected(a: i32, b: i32) -> f64 {
        1.0 / (1.0 + 10f64.powf(f64::from(b - a) / 400.0))
    }

    /// Rating change for `a` after playing `b`; halves round up
    pub fn delta(&self, a: i32, b: i32, outcome: Outcome) -> i32 {
        let raw = self.k * (outcome.score() - Self::expected(a, b));
        (raw + 0.5).floor() as i32
    }
}

/// Applied change for both participants of one duel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingChange {
    pub player_id: PlayerId,
    pub player_delta: i32,
    pub player_rating: i32,
    pub opponent_id: PlayerId,
    pub opponent_delta: i32,
    pub opponent_rating: i32,
}

/// Player rating store
#[derive(Debug)]
pub struct RatingBook {
    ratings: RwLock<HashMap<PlayerId, i32>>,
    calculator: RatingCalculator,
    default_rating: i32,
    pool: Option<SqlitePool>,
}

impl RatingBook {
    pub fn new(calculator: RatingCalculator, default_rating: i32, pool: Option<SqlitePool>) -> Self {
        Self {
            ratings: RwLock::new(HashMap::new()),
            calculator,
            default_rating,
            pool,
        }
    }

    pub fn shared(
        calculator: RatingCalculator,
        default_rating: i32,
        pool: Option<SqlitePool>,
    ) -> Arc<Self> {
        Arc::new(Self::new(calculator, default_rating, pool))
    }

    /// Current rating; unknown players start at the default
    pub async fn get(&self, player_id: PlayerId) -> i32 {
        if let Some(&rating) = self.ratings.read().await.get(&player_id) {
            return rating;
        }

        if let Some(ref pool) = self.pool {
            match self.load_rating(player_id, pool).await {
                Ok(Some(rating)) => {
                    self.ratings.write().await.insert(player_id, rating);
                    return rating;
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to load rating for player {}: {}", player_id, e),
            }
        }

        self.default_rating
    }

    /// Overwrite a rating
    pub async fn set(&self, player_id: PlayerId, rating: i32) {
        let mut ratings = self.ratings.write().await;
        ratings.insert(player_id, rating);
        self.persist(player_id, rating).await;
    }

    /// Apply a finished duel to both players
    ///
    /// `outcome` is from `player_id`'s point of view. The read, the update
    /// and the write-through all happen under the book's write lock, so
    /// concurrent settlements for one player accumulate.
    pub async fn settle(
        &self,
        player_id: PlayerId,
        opponent_id: PlayerId,
        outcome: Outcome,
    ) -> RatingChange {
        // Pull stored ratings into memory first
        self.get(player_id).await;
        self.get(opponent_id).await;

        let mut ratings = self.ratings.write().await;
        let a = ratings.get(&player_id).copied().unwrap_or(self.default_rating);
        let b = ratings.get(&opponent_id).copied().unwrap_or(self.default_rating);

        let player_delta = self.calculator.delta(a, b, outcome);
        let opponent_delta = self.calculator.delta(b, a, outcome.reversed());

        let change = RatingChange {
            player_id,
            player_delta,
            player_rating: a + player_delta,
            opponent_id,
            opponent_delta,
            opponent_rating: b + opponent_delta,
        };

        ratings.insert(player_id, change.player_rating);
        ratings.insert(opponent_id, change.opponent_rating);
        self.persist(player_id, change.player_rating).await;
        self.persist(opponent_id, change.opponent_rating).await;
        drop(ratings);

        info!(
            "Rating settled: player {} {:+} -> {}, player {} {:+} -> {}",
            player_id,
            player_delta,
            change.player_rating,
            opponent_id,
            opponent_delta,
            change.opponent_rating
        );
        change
    }

    async fn load_rating(
        &self,
        player_id: PlayerId,
        pool: &SqlitePool,
    ) -> Result<Option<i32>, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT rating FROM players WHERE id = ?")
            .bind(player_id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(|(r,)| r as i32))
    }

    async fn persist(&self, player_id: PlayerId, rating: i32) {
        let Some(ref pool) = self.pool else {
            return;
        };
        let result = sqlx::query(
            r#"
            INSERT INTO players (id, rating, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(id) DO UPDATE SET rating = excluded.rating, updated_at = excluded.updated_at
            "#,
        )
        .bind(player_id)
        .bind(rating)
        .execute(pool)
        .await;

        if let Err(e) = result {
            warn!("Failed to persist rating for player {}: {}", player_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_pool;

    #[test]
    fn test_equal_ratings() {
        let calc = RatingCalculator::default();
        assert_eq!(calc.delta(1000, 1000, Outcome::Win), 16);
        assert_eq!(calc.delta(1000, 1000, Outcome::Loss), -16);
        assert_eq!(calc.delta(1000, 1000, Outcome::Draw), 0);
    }

    #[test]
    fn test_expected_is_symmetric() {
        let e = RatingCalculator::expected(1200, 1000);
        assert!((e + RatingCalculator::expected(1000, 1200) - 1.0).abs() < 1e-12);
        assert!(e > 0.75 && e < 0.77);
    }

    #[test]
    fn test_upset_pays_more() {
        let calc = RatingCalculator::default();
        let upset = calc.delta(1000, 1400, Outcome::Win);
        let expected_win = calc.delta(1400, 1000, Outcome::Win);
        assert!(upset > 16);
        assert!(expected_win < 16);
        assert_eq!(upset + expected_win, 32);
    }

    #[test]
    fn test_outcome_helpers() {
        assert_eq!(Outcome::from_score(1.0), Outcome::Win);
        assert_eq!(Outcome::from_score(0.5), Outcome::Draw);
        assert_eq!(Outcome::from_score(0.0), Outcome::Loss);
        assert_eq!(Outcome::Win.reversed(), Outcome::Loss);
    }

    #[tokio::test]
    async fn test_book_defaults_and_settles() {
        let book = RatingBook::new(RatingCalculator::default(), DEFAULT_RATING, None);
        assert_eq!(book.get(1).await, 1000);

        let change = book.settle(1, 2, Outcome::Win).await;
        assert_eq!(change.player_delta, 16);
        assert_eq!(change.opponent_delta, -16);
        assert_eq!(book.get(1).await, 1016);
        assert_eq!(book.get(2).await, 984);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_settlements_accumulate() {
        let pool = test_pool().await;
        let book = Arc::new(RatingBook::new(
            RatingCalculator::default(),
            DEFAULT_RATING,
            Some(pool.clone()),
        ));

        let handles: Vec<_> = (2..=9)
            .map(|opponent| {
                let book = book.clone();
                tokio::spawn(async move { book.settle(1, opponent, Outcome::Win).await })
            })
            .collect();
        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap().player_delta;
        }

        assert!(total > 8 * 10);
        assert_eq!(book.get(1).await, DEFAULT_RATING + total);

        let fresh = RatingBook::new(RatingCalculator::default(), DEFAULT_RATING, Some(pool));
        assert_eq!(fresh.get(1).await, DEFAULT_RATING + total);
    }

    #[tokio::test]
    async fn test_book_persists() {
        let pool = test_pool().await;
        let book = RatingBook::new(RatingCalculator::default(), DEFAULT_RATING, Some(pool.clone()));
        book.set(5, 1300).await;

        let fresh = RatingBook::new(RatingCalculator::default(), DEFAULT_RATING, Some(pool));
        assert_eq!(fresh.get(5).await, 1300);
        assert_eq!(fresh.get(6).await, 1000);
    }
}
