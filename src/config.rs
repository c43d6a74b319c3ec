//! Server configuration
//!
//! Layered with figment: compiled-in defaults, then an optional TOML file,
//! then `DUELD_*` environment variables (`__` separates nested keys). The
//! binary applies CLI flags last.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::abilities::MAX_LOADOUT;

/// Game rule knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Round at which an undecided duel becomes a draw
    pub turn_limit: u32,
    pub max_abilities: usize,
    pub pick_timeout_secs: u64,
    pub draft_ttl_secs: u64,
    pub timer_tick_ms: u64,
    pub k_factor: f64,
    pub default_rating: i32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            turn_limit: 10,
            max_abilities: MAX_LOADOUT,
            pick_timeout_secs: 30,
            draft_ttl_secs: 600,
            timer_tick_ms: 250,
            k_factor: 32.0,
            default_rating: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    pub initial_range: i32,
    pub range_step: i32,
    pub step_secs: u64,
    pub unbounded_after_secs: u64,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            initial_range: 150,
            range_step: 50,
            step_secs: 30,
            unbounded_after_secs: 180,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// SQLite file; `None` = in-memory
    pub db_path: Option<String>,
    pub game: GameConfig,
    pub matchmaking: MatchmakingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            db_path: None, // None = in-memory
            game: GameConfig::default(),
            matchmaking: MatchmakingConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, then TOML, then environment
    pub fn figment(toml_path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        figment = match toml_path {
            Some(path) => figment.merge(Toml::file(path)),
            None => figment.merge(Toml::file("dueld.toml")),
        };
        figment.merge(Env::prefixed("DUELD_").split("__"))
    }

    pub fn load(toml_path: Option<&Path>) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(toml_path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject rule values the duel engine cannot honor
    pub fn validate(&self) -> Result<(), figment::Error> {
        if !(1..=MAX_LOADOUT).contains(&self.game.max_abilities) {
            return Err(figment::Error::from(format!(
                "game.max_abilities must be between 1 and {}, got {}",
                MAX_LOADOUT, self.game.max_abilities
            )));
        }
        Ok(())
    }
}
