//! Draft endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{ApiResult, AppState};
use crate::abilities::AbilityId;
use crate::draft::{DraftOutcome, DraftView, PickResult};
use crate::{BattleId, PlayerId};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/draft", post(init_draft))
        .route("/draft/{id}", get(get_draft))
        .route("/draft/{id}/pick", post(pick))
        .route("/draft/{id}/ready", post(ready))
        .route("/draft/{id}/finalize", post(finalize))
}

#[derive(Debug, Deserialize)]
pub struct InitDraftRequest {
    pub battle_id: BattleId,
    pub player1_id: PlayerId,
    pub player2_id: PlayerId,
}

#[derive(Debug, Deserialize)]
pub struct PickRequest {
    pub player_id: PlayerId,
    pub ability_id: AbilityId,
}

#[derive(Debug, Deserialize)]
pub struct ReadyRequest {
    pub player_id: PlayerId,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub all_ready: bool,
}

async fn init_draft(
    State(state): State<AppState>,
    Json(req): Json<InitDraftRequest>,
) -> ApiResult<DraftView> {
    let view = state
        .arena
        .init_draft(req.battle_id, req.player1_id, req.player2_id)
        .await?;
    Ok(Json(view))
}

async fn get_draft(State(state): State<AppState>, Path(id): Path<BattleId>) -> ApiResult<DraftView> {
    Ok(Json(state.arena.get_draft(id).await?))
}

async fn pick(
    State(state): State<AppState>,
    Path(id): Path<BattleId>,
    Json(req): Json<PickRequest>,
) -> ApiResult<PickResult> {
    Ok(Json(state.arena.pick(id, req.player_id, req.ability_id).await?))
}

async fn ready(
    State(state): State<AppState>,
    Path(id): Path<BattleId>,
    Json(req): Json<ReadyRequest>,
) -> ApiResult<ReadyResponse> {
    let all_ready = state.arena.set_ready(id, req.player_id).await?;
    Ok(Json(ReadyResponse { all_ready }))
}

async fn finalize(State(state): State<AppState>, Path(id): Path<BattleId>) -> ApiResult<DraftOutcome> {
    Ok(Json(state.arena.finalize_draft(id).await?))
}
