//! HTTP and WebSocket API for the game server.
//!
//! Two surfaces share one router:
//!
//! - The client gateway: `GET /ws?token=…` upgrades to a WebSocket after
//!   the credential token verifies, then speaks the tagged-JSON event
//!   protocol ([`websocket`]).
//! - Administrative endpoints for the directory and agent services:
//!   seat players, submit agent actions, read personalized game state
//!   ([`admin`]).
//!
//! All game mutations funnel through the per-table session actors; the
//! handlers here only translate between the wire and
//! [`holdem_core::TableRegistry`].

pub mod admin;
pub mod connections;
pub mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use holdem_core::directory::DirectoryClient;
use holdem_core::TableRegistry;

use connections::ConnectionRegistry;

/// Application state shared across handlers and WebSocket connections.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TableRegistry>,
    pub directory: Arc<DirectoryClient>,
    pub connections: Arc<ConnectionRegistry>,
    /// Fallback per-action timeout for tables the directory does not
    /// configure.
    pub default_action_timeout_secs: u64,
    pub reconnect_grace_ms: u64,
}

/// Build the complete router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/seat-player", post(admin::seat_player))
        .route("/agent-action", post(admin::agent_action))
        .route("/game/{game_id}/state", get(admin::game_state))
        .route("/ws", get(websocket::websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
async fn health_check() -> &'static str {
    "OK"
}
