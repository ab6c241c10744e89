//! # holdem_core
//!
//! A real-time multiplayer Texas Hold'em engine: the authoritative hand
//! state machine, hand evaluation, per-table session actors, and the
//! cache-backed state lifecycle.
//!
//! ## Architecture
//!
//! - [`game`]: cards, seats, best-of-seven evaluation, and the [`Hand`]
//!   state machine (deal → preflop → flop → turn → river → showdown →
//!   complete) with full betting rules and byte serialization.
//! - [`table`]: one actor per table serializing every mutation of that
//!   table's hand, readiness sets, timers, chat, and cache entry; the
//!   [`TableRegistry`] owns the table and user indexes.
//! - [`cache`]: keyed blob store (`hand:<table_id>`) holding the
//!   serialized hand between transitions.
//! - [`directory`]: thin outbound client for the directory service
//!   (token verification, wallet intents, unseat/cleanup, hand history).
//!
//! The transport layer (WebSocket gateway and administrative HTTP
//! endpoints) lives in the `holdem_server` crate; everything here is
//! transport-agnostic.

pub mod cache;
pub mod directory;
pub mod game;
pub mod table;

pub use game::{
    entities::{Action, Card, Chips, Seat, Stage, Suit},
    errors::HandError,
    hand::{Hand, HandConfig, HandView},
};
pub use table::{TableConfig, TableRegistry};
