//! dueld - dice duel server daemon

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dueld::{Config, Server};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Dice duel server: matchmaking, draft and turn resolution
#[derive(Parser, Debug)]
#[command(name = "dueld", version, about)]
struct Args {
    /// TOML config file (defaults to ./dueld.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// SQLite database file (in-memory when omitted)
    #[arg(short, long)]
    database: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dueld=info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if args.database.is_some() {
        config.db_path = args.database;
    }
    info!(
        "Config: turn limit {}, {} abilities, {}s pick timeout",
        config.game.turn_limit, config.game.max_abilities, config.game.pick_timeout_secs
    );

    let server = Arc::new(Server::new(config).await?);

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            signal_server.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
