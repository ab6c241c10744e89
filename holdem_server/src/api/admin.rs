//! Administrative HTTP handlers: seating players on behalf of the
//! directory and driving agent actions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use holdem_core::game::entities::{Action, Chips};
use holdem_core::game::hand::HandView;
use holdem_core::table::{SessionError, TableConfig};

use super::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn not_found(message: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn internal(message: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatPlayerRequest {
    pub table_id: String,
    pub user_id: i64,
    pub username: String,
    pub stack: i64,
    pub seat_number: usize,
    pub community_id: Option<String>,
    pub table_name: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatPlayerResponse {
    pub game_id: String,
    pub player_id: i64,
    pub players_count: usize,
    pub max_seats: usize,
}

/// Seat a player at a table, creating the table session on first use.
///
/// When the request does not pin an action timeout, the directory's
/// table configuration is consulted before falling back to the server
/// default.
pub async fn seat_player(
    State(state): State<AppState>,
    Json(request): Json<SeatPlayerRequest>,
) -> Result<Json<SeatPlayerResponse>, ApiError> {
    metrics::counter!("holdem_seat_requests_total").increment(1);

    if request.stack <= 0 {
        return Err(bad_request("stack must be positive"));
    }
    let Ok(stack) = Chips::try_from(request.stack) else {
        return Err(bad_request("stack is out of range"));
    };

    let action_timeout_secs = match request.timeout_seconds {
        Some(timeout) => timeout,
        None => state
            .directory
            .table_config(&request.table_id)
            .await
            .ok()
            .and_then(|c| c.action_timeout_seconds)
            .unwrap_or(state.default_action_timeout_secs),
    };

    let config = TableConfig {
        name: request
            .table_name
            .clone()
            .unwrap_or_else(|| request.table_id.clone()),
        action_timeout_secs,
        reconnect_grace_ms: state.reconnect_grace_ms,
        initial_stack: stack,
        ..TableConfig::default()
    };

    match state
        .registry
        .seat_player(
            &request.table_id,
            request.community_id.clone(),
            config,
            request.user_id,
            request.username.clone(),
            request.seat_number,
            stack,
        )
        .await
    {
        Ok(info) => Ok(Json(SeatPlayerResponse {
            game_id: info.game_id,
            player_id: info.player_id,
            players_count: info.players_count,
            max_seats: info.max_seats,
        })),
        Err(
            e @ (SessionError::SeatOccupied(_)
            | SessionError::TableFull
            | SessionError::AlreadySeated),
        ) => Err(bad_request(e.to_string())),
        Err(SessionError::Game(e)) => Err(bad_request(e.to_string())),
        Err(e) => Err(internal(e.to_string())),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentActionRequest {
    pub user_id: i64,
    pub game_id: String,
    pub action: String,
    pub amount: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    pub state_for_player: HandView,
}

/// Submit an action for an agent. The (userId, gameId) pair must resolve
/// to exactly one seat; a user seated elsewhere is refused rather than
/// guessed at.
pub async fn agent_action(
    State(state): State<AppState>,
    Json(request): Json<AgentActionRequest>,
) -> Result<Json<StateResponse>, ApiError> {
    let action = Action::parse(&request.action, request.amount)
        .map_err(|e| bad_request(e.to_string()))?;

    if state.registry.get(&request.game_id).await.is_none() {
        return Err(not_found("game not found"));
    }
    match state.registry.table_for_user(request.user_id).await {
        None => return Err(not_found("player not found")),
        Some(table_id) if table_id != request.game_id => {
            return Err(bad_request("player is not seated at this game"));
        }
        Some(_) => {}
    }

    match state
        .registry
        .submit_action_at(&request.game_id, request.user_id, action)
        .await
    {
        Ok(view) => {
            metrics::counter!("holdem_actions_admitted_total").increment(1);
            Ok(Json(StateResponse {
                state_for_player: view,
            }))
        }
        Err(SessionError::NotSeated) => Err(not_found("player not found")),
        Err(SessionError::Game(e)) => {
            metrics::counter!("holdem_actions_rejected_total").increment(1);
            Err(bad_request(e.to_string()))
        }
        Err(e) => Err(internal(e.to_string())),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateQuery {
    pub user_id: i64,
}

/// Personalized game state for a seated user.
pub async fn game_state(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Query(query): Query<StateQuery>,
) -> Result<Json<StateResponse>, ApiError> {
    match state.registry.state_for(&game_id, query.user_id).await {
        Some(view) => Ok(Json(StateResponse {
            state_for_player: view,
        })),
        None => Err(not_found("game or player not found")),
    }
}
