//! dueld - dice duel server daemon
//!
//! Rating-windowed matchmaking, a timed snake draft of abilities, and a
//! server-authoritative duel engine with bosses and mutators.

pub mod abilities;
pub mod api;
pub mod arena;
pub mod combat;
pub mod config;
pub mod db;
pub mod draft;
pub mod error;
pub mod events;
pub mod matchmaking;
pub mod rating;
pub mod timers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

pub use arena::Arena;
pub use config::Config;
pub use error::{GameError, GameResult};

use combat::{DiceSource, SecureDice};
use db::Database;

/// Player identifier
pub type PlayerId = i64;

/// Battle identifier, shared by a draft and the duel it feeds
pub type BattleId = i64;

/// The dueld server instance
pub struct Server {
    config: Config,
    db: Arc<Database>,
    arena: Arc<Arena>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Create a new server instance
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_dice(config, Arc::new(SecureDice)).await
    }

    /// Create a server with a specific dice source
    pub async fn with_dice(config: Config, dice: Arc<dyn DiceSource>) -> Result<Self> {
        let db = Database::new(config.db_path.as_deref()).await?;
        let arena = Arena::shared(&config, dice, Some(db.pool().clone()));
        arena.restore().await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            db: Arc::new(db),
            arena,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Get the database handle
    pub fn db(&self) -> Arc<Database> {
        self.db.clone()
    }

    pub fn arena(&self) -> Arc<Arena> {
        self.arena.clone()
    }

    /// Build the router
    fn router(&self) -> Router {
        api::router(self.db.clone(), self.arena.clone())
    }

    /// Run the server until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run on an already-bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!("dueld listening on {}", local_addr);

        let timer_loop = self.arena.clone().spawn_timer_loop(
            Duration::from_millis(self.config.game.timer_tick_ms.max(1)),
            self.shutdown_rx.clone(),
        );

        let router = self.router();
        let mut shutdown_rx = self.shutdown_rx.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
            })
            .await?;

        timer_loop.await.ok();
        info!("dueld shutdown complete");
        Ok(())
    }

    /// Signal the server to shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
