//! Table session message and event types.

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::chat::ChatMessage;
use crate::game::entities::{Action, Chips};
use crate::game::hand::{HandView, WinnerShare};
use thiserror::Error;

/// Errors returned by table session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("seat {0} is occupied")]
    SeatOccupied(usize),

    #[error("table is full")]
    TableFull,

    #[error("already seated at this table")]
    AlreadySeated,

    #[error("not seated at this table")]
    NotSeated,

    #[error("{0}")]
    Game(#[from] crate::game::errors::HandError),

    #[error("table is closed")]
    Closed,
}

/// Result of seating a player, echoed back to the administrative caller.
#[derive(Clone, Debug, Serialize)]
pub struct SeatedInfo {
    pub game_id: String,
    pub player_id: i64,
    pub players_count: usize,
    pub max_seats: usize,
}

/// Messages accepted by a [`super::session::TableSession`] actor. All
/// hand mutations for a table funnel through this inbox, which is what
/// serializes them.
#[derive(Debug)]
pub enum SessionMessage {
    /// Seat a player (administrative path).
    SeatPlayer {
        user_id: i64,
        name: String,
        seat: usize,
        buy_in: Chips,
        respond: oneshot::Sender<Result<SeatedInfo, SessionError>>,
    },

    /// A client socket for a seated user came up. Repeats with the same
    /// (user, socket) pair are no-ops; a recorded disconnect makes this a
    /// reconnection.
    Connect {
        user_id: i64,
        socket_id: Uuid,
        sender: mpsc::Sender<ServerEvent>,
    },

    /// A client socket went away. Ignored when `socket_id` is stale.
    Disconnect { user_id: i64, socket_id: Uuid },

    /// Player action through the admission funnel.
    TakeAction {
        user_id: i64,
        action: Action,
        respond: Option<oneshot::Sender<Result<HandView, SessionError>>>,
    },

    /// Chat message to the table room.
    Chat { user_id: i64, text: String },

    /// Personalized snapshot for a user (agent/administrative reads).
    GetState {
        user_id: i64,
        respond: oneshot::Sender<Option<HandView>>,
    },

    /// Player leaves the table; their remaining stack is reported as a
    /// payout intent.
    Leave {
        user_id: i64,
        respond: Option<oneshot::Sender<Result<(), SessionError>>>,
    },

    /// Timer pulse; drives action timeouts, reconnect-grace expiry, and
    /// the delayed next-hand start.
    Tick,
}

/// Lifecycle notifications from sessions back to the registry, which
/// owns the table and user indexes.
#[derive(Clone, Debug)]
pub enum RegistryEvent {
    UserLeft { user_id: i64, table_id: String },
    TableClosed { table_id: String },
}

/// Events fanned out to connected clients. Serialized as tagged JSON on
/// the WebSocket.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        socket_id: String,
        message: String,
    },
    TableStateUpdate {
        state: HandView,
    },
    ActionError {
        reason: String,
    },
    ChatMessage {
        message: ChatMessage,
    },
    ChatHistory {
        messages: Vec<ChatMessage>,
    },
    PlayerDisconnected {
        name: String,
        grace_ms: u64,
    },
    PlayerReconnected {
        name: String,
    },
    Reconnected {
        table_id: String,
        state: HandView,
    },
    ActionTimeout {
        name: String,
    },
    HandComplete {
        winners: Vec<WinnerShare>,
        pot: Chips,
    },
    Error {
        message: String,
    },
}
