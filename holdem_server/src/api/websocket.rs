//! WebSocket client gateway.
//!
//! Connection flow:
//!
//! 1. Client connects via `GET /ws?token=<credential>`.
//! 2. The token verifies through the directory adapter (locally in test
//!    mode); failure refuses the upgrade with 401.
//! 3. The socket binds into the connection registry (one live socket
//!    per user, newest wins) and attaches to whatever table hosts the
//!    user's seat, which may start the hand or resume a reconnect
//!    window.
//! 4. Inbound events are dispatched until the socket closes; transport
//!    errors are treated as a disconnect.
//!
//! Outbound traffic is a per-client channel drained by a send task, so
//! event order toward one client matches the order the table actor
//! emitted them.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use holdem_core::directory::VerifiedUser;
use holdem_core::game::entities::Action;
use holdem_core::table::{ServerEvent, SessionError};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

/// Events clients send over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ClientEvent {
    /// Attach to the table hosting the user's seat.
    JoinTable {
        #[allow(dead_code)]
        community_id: Option<String>,
    },
    /// Poker action.
    Action { kind: String, amount: Option<i64> },
    /// Table chat.
    Chat {
        text: String,
        table_id: Option<String>,
    },
    /// Give up the seat and cash out.
    LeaveTable,
}

/// Upgrade to a WebSocket after the credential token verifies.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let user = match state.directory.verify_token(&query.token).await {
        Ok(user) => user,
        Err(e) => {
            warn!("WebSocket auth refused: {e}");
            return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, user, state))
}

async fn handle_socket(socket: WebSocket, user: VerifiedUser, state: AppState) {
    let socket_id = Uuid::new_v4();
    metrics::counter!("holdem_ws_connections_total").increment(1);
    info!("WebSocket connected: user={} socket={}", user.id, socket_id);

    let (mut sink, mut stream) = socket.split();
    let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(64);

    state.connections.bind(user.id, socket_id).await;

    let _ = event_tx
        .send(ServerEvent::Connected {
            socket_id: socket_id.to_string(),
            message: format!("Welcome, {}", user.username),
        })
        .await;

    // Attach to the table hosting this user's seat, if any. This is also
    // the reconnection path: the session resumes a pending disconnect
    // record when one exists.
    state
        .registry
        .connect_user(user.id, socket_id, event_tx.clone())
        .await;

    // Drain the outbound channel onto the socket.
    let send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!("failed to serialize outbound event: {e}");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    handle_client_event(event, &user, socket_id, &event_tx, &state).await;
                }
                Err(e) => {
                    warn!("unparseable client event from user {}: {e}", user.id);
                    let _ = event_tx
                        .send(ServerEvent::Error {
                            message: "Invalid message format".to_string(),
                        })
                        .await;
                }
            },
            Ok(Message::Close(_)) => break,
            // Read failure is a disconnect.
            Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    // Tear down only while this socket is still the live one; a newer
    // connection for the same user must stay bound.
    if state.connections.release(user.id, socket_id).await {
        state.registry.disconnect_user(user.id, socket_id).await;
    }
    info!(
        "WebSocket disconnected: user={} socket={}",
        user.id, socket_id
    );
}

async fn handle_client_event(
    event: ClientEvent,
    user: &VerifiedUser,
    socket_id: Uuid,
    event_tx: &mpsc::Sender<ServerEvent>,
    state: &AppState,
) {
    match event {
        ClientEvent::JoinTable { .. } => {
            if state
                .registry
                .connect_user(user.id, socket_id, event_tx.clone())
                .await
                .is_none()
            {
                let _ = event_tx
                    .send(ServerEvent::Error {
                        message: "You are not seated at any table".to_string(),
                    })
                    .await;
            }
        }

        ClientEvent::Action { kind, amount } => match Action::parse(&kind, amount) {
            Ok(action) => match state.registry.submit_action(user.id, action).await {
                Ok(_) => {
                    metrics::counter!("holdem_actions_admitted_total").increment(1);
                }
                Err(SessionError::Game(_)) => {
                    // The session already pushed the action_error event.
                    metrics::counter!("holdem_actions_rejected_total").increment(1);
                }
                Err(e) => {
                    metrics::counter!("holdem_actions_rejected_total").increment(1);
                    let _ = event_tx
                        .send(ServerEvent::ActionError {
                            reason: e.to_string(),
                        })
                        .await;
                }
            },
            Err(e) => {
                let _ = event_tx
                    .send(ServerEvent::ActionError {
                        reason: e.to_string(),
                    })
                    .await;
            }
        },

        ClientEvent::Chat { text, table_id } => {
            state.registry.chat(user.id, text, table_id).await;
        }

        ClientEvent::LeaveTable => {
            if let Err(e) = state.registry.leave(user.id).await {
                let _ = event_tx
                    .send(ServerEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        }
    }
}
