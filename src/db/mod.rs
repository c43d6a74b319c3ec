//! Database module - SQLite persistence for players, duels and drafts

mod ability_list;
#[cfg(test)]
pub mod test_utils;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

pub use ability_list::{AbilityList, ABILITY_LIST_VERSION};

/// Database handle wrapping SQLite connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    /// If path is None, uses in-memory database (for testing)
    pub async fn new(path: Option<&str>) -> Result<Self> {
        let conn_str = match path {
            Some(p) => format!("sqlite:{}?mode=rwc", p),
            None => "sqlite::memory:".to_string(),
        };

        let options = SqliteConnectOptions::from_str(&conn_str)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        // An in-memory database lives only as long as its connection
        let max_connections = if path.is_some() { 10 } else { 1 };

        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        if path.is_none() {
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                id INTEGER PRIMARY KEY,
                rating INTEGER NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Duels; `state` holds the full JSON snapshot used for restore
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS battles (
                id INTEGER PRIMARY KEY,
                kind TEXT NOT NULL,
                player_id INTEGER NOT NULL,
                opponent_id INTEGER,
                status TEXT NOT NULL,
                player_abilities TEXT NOT NULL,
                enemy_abilities TEXT NOT NULL,
                boss TEXT,
                mutator TEXT,
                state TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Draft archive
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS drafts (
                battle_id INTEGER PRIMARY KEY,
                player1_id INTEGER NOT NULL,
                player2_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                player1_picks TEXT NOT NULL,
                player2_picks TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_battles_status ON battles(status)")
            .execute(&self.pool)
            .await?;

        info!("Database migrations complete");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if database is healthy
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
