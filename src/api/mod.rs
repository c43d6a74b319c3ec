//! HTTP API module - REST endpoints and WebSocket

mod battles;
mod draft;
mod matchmaking;
mod websocket;

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use crate::arena::Arena;
use crate::db::Database;
use crate::error::GameError;
use crate::PlayerId;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub arena: Arc<Arena>,
}

/// Build the API router
pub fn router(db: Arc<Database>, arena: Arc<Arena>) -> Router {
    let state = AppState { db, arena };

    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
        .route("/abilities", get(abilities))
        .route("/players/{id}/rating", get(rating))
        .route("/ws", get(websocket::ws_handler))
        .merge(matchmaking::router())
        .merge(draft::router())
        .merge(battles::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

/// Game error on its way to the client
#[derive(Debug)]
pub struct ApiError(GameError);

impl From<GameError> for ApiError {
    fn from(e: GameError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::InvalidState(_) | GameError::Conflict(_) => StatusCode::CONFLICT,
            GameError::Validation(_) => StatusCode::BAD_REQUEST,
            GameError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            GameError::Storage(_) | GameError::Encoding(_) => {
                error!("Internal error: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                kind: self.0.kind(),
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Root endpoint
async fn root() -> impl IntoResponse {
    Json(RootResponse {
        name: "dueld",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                database: "ok",
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy",
                database: "error",
            }),
        ),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
}

/// Ability catalog
async fn abilities(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.arena.abilities())
}

#[derive(Serialize)]
struct RatingResponse {
    player_id: PlayerId,
    rating: i32,
}

async fn rating(State(state): State<AppState>, Path(player_id): Path<PlayerId>) -> impl IntoResponse {
    Json(RatingResponse {
        player_id,
        rating: state.arena.rating(player_id).await,
    })
}
