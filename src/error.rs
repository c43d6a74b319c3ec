//! Core error taxonomy
//!
//! Every fallible core operation returns `GameError`. Ability handler failures
//! use their own `AbilityError` and never surface here.

use thiserror::Error;

/// Errors surfaced to callers of the matchmaking, draft and duel services
#[derive(Debug, Error)]
pub enum GameError {
    /// Unknown battle, player, ability, ticket, boss or mutator
    #[error("not found: {0}")]
    NotFound(String),

    /// Wrong turn, wrong phase, or action after a terminal state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed request (too many abilities, bad dice index, ...)
    #[error("validation failed: {0}")]
    Validation(String),

    /// Lost a race against another mutation (double pick, double match, stale timer)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Draft session expired or deadline path
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("database error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl GameError {
    pub fn not_found(what: impl Into<String>) -> Self {
        GameError::NotFound(what.into())
    }

    pub fn invalid_state(what: impl Into<String>) -> Self {
        GameError::InvalidState(what.into())
    }

    pub fn validation(what: impl Into<String>) -> Self {
        GameError::Validation(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        GameError::Conflict(what.into())
    }

    /// Short machine-readable kind, used by the HTTP layer
    pub fn kind(&self) -> &'static str {
        match self {
            GameError::NotFound(_) => "not_found",
            GameError::InvalidState(_) => "invalid_state",
            GameError::Validation(_) => "validation",
            GameError::Conflict(_) => "conflict",
            GameError::Timeout(_) => "timeout",
            GameError::Storage(_) => "storage",
            GameError::Encoding(_) => "encoding",
        }
    }
}

pub type GameResult<T> = Result<T, GameError>;
