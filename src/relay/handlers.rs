// relay/handlers.rs

use super::{ClientEntry, RelayState, parse_command};
use crate::{
    connection::AUTH_HEADER,
    error::AppError,
    models::{ForwardedMessage, RelayInfo, RelayStats},
    utils,
};
use axum::{
    Json,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    http::HeaderMap,
    response::IntoResponse,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[utoipa::path(get, path = "/", responses((status = 200, body = RelayInfo)))]
pub async fn root() -> Json<RelayInfo> {
    Json(RelayInfo {
        message: "Device relay is running!".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[utoipa::path(get, path = "/stats", responses((status = 200, body = RelayStats)))]
pub async fn stats(State(state): State<Arc<RelayState>>) -> Json<RelayStats> {
    Json(RelayStats {
        active_connections: state.clients.len(),
        clients: state.connected_clients(),
    })
}

pub async fn handle_ws_upgrade(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<RelayState>>,
) -> impl IntoResponse {
    let token = headers
        .get(AUTH_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    info!(%client_id, "Client connection attempt");
    ws.on_upgrade(move |socket| handle_client(socket, client_id, token, state))
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.to_owned().into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        warn!("Failed to send close frame ({}): {}", code, e);
    }
}

async fn handle_client(
    socket: WebSocket,
    client_id: String,
    token: Option<String>,
    state: Arc<RelayState>,
) {
    if !state.auth.authorize(&client_id, token.as_deref()).await {
        warn!("Unauthorized connection attempt: {}", client_id);
        close_with(socket, close_code::POLICY, "unauthorized").await;
        return;
    }

    let session_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel::<String>(100);
    let registered = match state.clients.entry(client_id.clone()) {
        Entry::Occupied(_) => false,
        Entry::Vacant(slot) => {
            slot.insert(ClientEntry {
                session_id,
                tx,
                connected_at: Utc::now(),
            });
            true
        }
    };
    if !registered {
        warn!("Client ID '{}' is already connected.", client_id);
        close_with(socket, close_code::NORMAL, "already connected").await;
        return;
    }
    metrics::gauge!("relay_active_connections").set(state.clients.len() as f64);
    info!(%session_id, "Client connected: {}", client_id);

    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        let mut rx = rx;
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn({
        let state = Arc::clone(&state);
        let client_id = client_id.clone();
        async move {
            while let Some(frame) = receiver.next().await {
                match frame {
                    Ok(Message::Text(text)) => route(&state, &client_id, text.as_str()),
                    // the next read flushes the close reply and ends the stream
                    Ok(Message::Close(_)) => debug!(%client_id, "Close frame received"),
                    Ok(_) => {}
                    Err(e) => {
                        error!(%client_id, "Receive error: {}", e);
                        break;
                    }
                }
            }
        }
    });

    tokio::pin!(send_task, recv_task);
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    };

    utils::cleanup_client_connection(&client_id, session_id, &state);
}

/// Controller frames are addressed commands; everything else goes to the
/// controller tagged with its sender.
fn route(state: &RelayState, client_id: &str, text: &str) {
    let controller_id = state.controller_id.as_str();
    if client_id == controller_id {
        match parse_command(text) {
            Ok(command) => {
                debug!("{} -> ({}): {}", client_id, command.target, command.message);
                state.deliver(&command.target, command.message);
            }
            Err(AppError::InvalidJson(_)) => {
                state.deliver(controller_id, "Invalid JSON format.".to_string());
            }
            Err(_) => {
                state.deliver(
                    controller_id,
                    "Invalid JSON. Need 'target' and 'message'".to_string(),
                );
            }
        }
        return;
    }

    debug!("{} -> ({}): {}", client_id, controller_id, text);
    let forwarded = ForwardedMessage {
        sender: client_id.to_string(),
        message: text.to_string(),
    };
    match serde_json::to_string(&forwarded) {
        Ok(payload) => {
            state.deliver(controller_id, payload);
        }
        Err(e) => error!(%client_id, "Failed to encode forwarded message: {}", e),
    }
}
