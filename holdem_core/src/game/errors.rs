//! Hand state machine error types.

use thiserror::Error;

/// Errors surfaced by the hand state machine. Admission failures carry a
/// human-readable reason that is forwarded to the acting player verbatim;
/// none of them leave the hand in a modified state.
#[derive(Debug, Error)]
pub enum HandError {
    /// Malformed input (bad amount, unknown action kind, bad seat number).
    #[error("{0}")]
    InvalidInput(String),

    /// A rule precondition failed ("Not your turn", "Cannot check", ...).
    #[error("{0}")]
    InvalidAction(String),

    /// A should-never-happen condition. The owning actor logs it and
    /// reloads the last persisted state rather than continuing.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The action deadline passed; only the timeout handler may resolve it.
    #[error("action deadline has passed")]
    Timeout,

    /// Seat already taken.
    #[error("seat {0} is occupied")]
    SeatOccupied(usize),

    /// No open seats left.
    #[error("table is full")]
    TableFull,

    /// The user already holds a seat at this table.
    #[error("already seated")]
    AlreadySeated,

    /// Hands need at least two funded seats.
    #[error("need 2+ players with chips")]
    NotEnoughSeats,

    /// No seat for the given user.
    #[error("player not found")]
    UnknownSeat,

    /// State bytes could not be encoded or decoded.
    #[error("state serialization failed: {0}")]
    Serialization(#[from] bincode::Error),
}

/// Result type for hand operations.
pub type HandResult<T> = Result<T, HandError>;
