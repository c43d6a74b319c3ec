//! WebSocket event stream
//!
//! `/ws?player_id=N` forwards the player's game events as JSON text frames.
//! A reconnect replaces the previous stream.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::AppState;
use crate::PlayerId;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub player_id: PlayerId,
}

/// Control frames sent alongside game events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome { player_id: PlayerId },
    Pong,
}

/// Messages sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}

/// Handle WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.player_id))
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, msg: &T) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode websocket message: {}", e);
            true
        }
    }
}

/// Handle an individual WebSocket connection
async fn handle_socket(mut socket: WebSocket, state: AppState, player_id: PlayerId) {
    let events = state.arena.events().clone();
    let mut rx = events.subscribe(player_id);
    info!("WebSocket connected: player {}", player_id);

    if !send_json(&mut socket, &ServerMessage::Welcome { player_id }).await {
        drop(rx);
        events.release(player_id);
        return;
    }

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    // Replaced by a newer connection
                    debug!("Event stream for player {} closed", player_id);
                    break;
                };
                if !send_json(&mut socket, &event).await {
                    break;
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(ClientMessage::Ping) = serde_json::from_str::<ClientMessage>(&text) {
                            if !send_json(&mut socket, &ServerMessage::Pong).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    drop(rx);
    events.release(player_id);
    info!("WebSocket disconnected: player {}", player_id);
}
