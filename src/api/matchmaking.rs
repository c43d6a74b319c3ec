//! Matchmaking endpoints

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use super::{ApiResult, AppState};
use crate::arena::{EnqueueOutcome, MatchFound};
use crate::PlayerId;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/matchmaking/enqueue", post(enqueue))
        .route("/matchmaking/leave", post(leave))
        .route("/matchmaking/match", post(try_match))
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub player_id: PlayerId,
    /// Stored rating when absent
    #[serde(default)]
    pub rating: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct PlayerRequest {
    pub player_id: PlayerId,
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub removed: bool,
}

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub matched: bool,
    #[serde(flatten)]
    pub found: Option<MatchFound>,
}

async fn enqueue(
    State(state): State<AppState>,
    Json(req): Json<EnqueueRequest>,
) -> ApiResult<EnqueueOutcome> {
    Ok(Json(state.arena.enqueue(req.player_id, req.rating).await?))
}

async fn leave(State(state): State<AppState>, Json(req): Json<PlayerRequest>) -> Json<LeaveResponse> {
    Json(LeaveResponse {
        removed: state.arena.leave(req.player_id),
    })
}

async fn try_match(
    State(state): State<AppState>,
    Json(req): Json<PlayerRequest>,
) -> ApiResult<MatchResponse> {
    let found = state.arena.try_match(req.player_id).await?;
    Ok(Json(MatchResponse {
        matched: found.is_some(),
        found,
    }))
}
