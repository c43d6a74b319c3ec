//! Duel endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::{ApiResult, AppState};
use crate::combat::{DuelState, RollResult, StartDuel};
use crate::{BattleId, PlayerId};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/battles", post(start))
        .route("/battles/{id}", get(status))
        .route("/battles/{id}/roll", post(roll))
}

#[derive(Debug, Deserialize)]
pub struct RollRequest {
    pub player_id: PlayerId,
}

async fn start(State(state): State<AppState>, Json(req): Json<StartDuel>) -> ApiResult<DuelState> {
    Ok(Json(state.arena.start_duel(req).await?))
}

async fn status(State(state): State<AppState>, Path(id): Path<BattleId>) -> ApiResult<DuelState> {
    Ok(Json(state.arena.get_status(id).await?))
}

async fn roll(
    State(state): State<AppState>,
    Path(id): Path<BattleId>,
    Json(req): Json<RollRequest>,
) -> ApiResult<RollResult> {
    Ok(Json(state.arena.roll_dice(id, req.player_id).await?))
}
