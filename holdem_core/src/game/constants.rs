//! Shared limits for tables and hands.

/// Hard cap on seats at a single table. A 52-card deck comfortably covers
/// nine two-card hands plus burns and a full board.
pub const MAX_SEATS: usize = 9;

/// Cards dealt to each seat at the start of a hand.
pub const HOLE_CARDS: usize = 2;

/// Community cards dealt across flop, turn, and river.
pub const BOARD_SIZE: usize = 5;

/// Upper bound on retained chat messages per table.
pub const CHAT_CAPACITY: usize = 100;

/// Delay between the end of one hand and the start of the next.
pub const NEXT_HAND_DELAY_MS: i64 = 3_000;
