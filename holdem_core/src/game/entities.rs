use rand::{seq::SliceRandom, thread_rng};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::HandError;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Club,
    Spade,
    Diamond,
    Heart,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Club, Suit::Spade, Suit::Diamond, Suit::Heart];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Club => "♣",
            Self::Spade => "♠",
            Self::Diamond => "♦",
            Self::Heart => "♥",
        };
        write!(f, "{repr}")
    }
}

/// Card values run 2..=14 with the ace always stored high; straight
/// detection treats the ace as 1 for the wheel.
pub type Value = u8;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Card(pub Value, pub Suit);

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = match self.0 {
            14 => "A",
            13 => "K",
            12 => "Q",
            11 => "J",
            v => &v.to_string(),
        };
        write!(f, "{value}{}", self.1)
    }
}

/// Type alias for chip amounts. Stacks, bets, and pots are whole chips;
/// a u32 holds more chips than any table will ever see.
pub type Chips = u32;

/// Ordered 52-card source. The backing vector always holds the full
/// permutation; `cursor` marks how many cards have left the deck (dealt
/// or burned), so serializing the deck preserves the remaining order.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Deck {
    cards: Vec<Card>,
    cursor: usize,
}

impl Default for Deck {
    fn default() -> Self {
        let mut cards = Vec::with_capacity(52);
        for value in 2..=14u8 {
            for suit in Suit::ALL {
                cards.push(Card(value, suit));
            }
        }
        Self { cards, cursor: 0 }
    }
}

impl Deck {
    pub fn new_shuffled() -> Self {
        let mut deck = Self::default();
        deck.shuffle();
        deck
    }

    /// Restore the full 52-card deck and permute it uniformly.
    pub fn shuffle(&mut self) {
        self.cards.shuffle(&mut thread_rng());
        self.cursor = 0;
    }

    pub fn deal(&mut self) -> Card {
        let card = self.cards[self.cursor];
        self.cursor += 1;
        card
    }

    /// Discard the top card face down.
    pub fn burn(&mut self) {
        self.cursor += 1;
    }

    pub fn remaining(&self) -> usize {
        self.cards.len() - self.cursor
    }
}

/// Betting stages of a hand.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Waiting,
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
    Complete,
}

impl Stage {
    /// True while a betting round can admit actions.
    pub fn is_betting(self) -> bool {
        matches!(self, Self::Preflop | Self::Flop | Self::Turn | Self::River)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Waiting => "waiting",
            Self::Preflop => "preflop",
            Self::Flop => "flop",
            Self::Turn => "turn",
            Self::River => "river",
            Self::Showdown => "showdown",
            Self::Complete => "complete",
        };
        write!(f, "{repr}")
    }
}

/// A player action submitted to the hand. Bet and raise amounts are the
/// increment over the current bet to match, never the total wagered.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", content = "amount", rename_all = "kebab-case")]
pub enum Action {
    Fold,
    Check,
    Call,
    Bet(Chips),
    Raise(Chips),
    AllIn,
}

impl Action {
    /// Parse the wire form used by clients and agents.
    pub fn parse(kind: &str, amount: Option<i64>) -> Result<Self, HandError> {
        let amount_for = |kind: &str| -> Result<Chips, HandError> {
            match amount {
                Some(a) if a > 0 => Chips::try_from(a).map_err(|_| {
                    HandError::InvalidInput(format!("{kind} amount {a} is out of range"))
                }),
                Some(a) => Err(HandError::InvalidInput(format!(
                    "{kind} amount must be positive, got {a}"
                ))),
                None => Err(HandError::InvalidInput(format!("{kind} requires an amount"))),
            }
        };
        match kind {
            "fold" => Ok(Self::Fold),
            "check" => Ok(Self::Check),
            "call" => Ok(Self::Call),
            "bet" => Ok(Self::Bet(amount_for("bet")?)),
            "raise" => Ok(Self::Raise(amount_for("raise")?)),
            "all-in" => Ok(Self::AllIn),
            other => Err(HandError::InvalidInput(format!("unknown action '{other}'"))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Fold => "folds".to_string(),
            Self::Check => "checks".to_string(),
            Self::Call => "calls".to_string(),
            Self::Bet(amount) => format!("bets ${amount}"),
            Self::Raise(amount) => format!("raises ${amount}"),
            Self::AllIn => "goes all-in".to_string(),
        };
        write!(f, "{repr}")
    }
}

/// One seat at the table: a player's stack, bets, cards, and status for
/// the hand in progress.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Seat {
    pub user_id: i64,
    pub name: String,
    /// Position at the table, 0-based.
    pub seat: usize,
    pub stack: Chips,
    /// Chips wagered in the current betting round; cleared at street
    /// boundaries.
    pub round_bet: Chips,
    /// Chips wagered across the whole hand; monotone within a hand.
    pub hand_bet: Chips,
    pub hole_cards: Vec<Card>,
    pub folded: bool,
    pub all_in: bool,
    pub in_hand: bool,
    /// Joined mid-hand away from the big-blind position; sits out until
    /// the big blind reaches this seat.
    pub waiting_for_big_blind: bool,
}

impl Seat {
    pub fn new(user_id: i64, name: String, seat: usize, stack: Chips) -> Self {
        Self {
            user_id,
            name,
            seat,
            stack,
            round_bet: 0,
            hand_bet: 0,
            hole_cards: Vec::with_capacity(2),
            folded: false,
            all_in: false,
            in_hand: false,
            waiting_for_big_blind: false,
        }
    }

    /// True while the seat can still be asked for an action.
    pub fn can_act(&self) -> bool {
        self.in_hand && !self.folded && !self.all_in
    }

    pub fn deal_hole_cards(&mut self, first: Card, second: Card) -> Result<(), HandError> {
        if !self.hole_cards.is_empty() {
            return Err(HandError::InvariantViolation(format!(
                "seat {} already holds cards",
                self.seat
            )));
        }
        self.hole_cards.push(first);
        self.hole_cards.push(second);
        Ok(())
    }

    /// Wager up to `amount` chips, capped at the stack. Returns the chips
    /// actually paid; the seat goes all-in when the stack reaches zero.
    pub fn wager(&mut self, amount: Chips) -> Chips {
        let paid = amount.min(self.stack);
        self.stack -= paid;
        self.round_bet += paid;
        self.hand_bet += paid;
        if self.stack == 0 && paid > 0 {
            self.all_in = true;
        }
        paid
    }

    pub fn fold(&mut self) {
        self.folded = true;
        self.in_hand = false;
    }

    pub fn add_chips(&mut self, amount: Chips) {
        self.stack += amount;
    }

    pub fn reset_for_new_street(&mut self) {
        self.round_bet = 0;
    }

    /// Clear all per-hand state. A broke seat is left out of the hand.
    pub fn reset_for_new_hand(&mut self) {
        self.round_bet = 0;
        self.hand_bet = 0;
        self.hole_cards.clear();
        self.folded = false;
        self.all_in = false;
        self.in_hand = self.stack > 0;
    }

    pub fn public_view(&self) -> PublicSeatView {
        PublicSeatView {
            user_id: self.user_id,
            name: self.name.clone(),
            seat: self.seat,
            stack: self.stack,
            round_bet: self.round_bet,
            hand_bet: self.hand_bet,
            hole_card_count: self.hole_cards.len(),
            folded: self.folded,
            all_in: self.all_in,
            in_hand: self.in_hand,
        }
    }

    pub fn private_view(&self) -> PrivateSeatView {
        PrivateSeatView {
            user_id: self.user_id,
            name: self.name.clone(),
            seat: self.seat,
            stack: self.stack,
            round_bet: self.round_bet,
            hand_bet: self.hand_bet,
            hole_cards: self.hole_cards.clone(),
            folded: self.folded,
            all_in: self.all_in,
            in_hand: self.in_hand,
        }
    }
}

/// What everyone at the table may see about a seat.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PublicSeatView {
    pub user_id: i64,
    pub name: String,
    pub seat: usize,
    pub stack: Chips,
    pub round_bet: Chips,
    pub hand_bet: Chips,
    pub hole_card_count: usize,
    pub folded: bool,
    pub all_in: bool,
    pub in_hand: bool,
}

/// What a seat may see about itself: the public view plus hole cards.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PrivateSeatView {
    pub user_id: i64,
    pub name: String,
    pub seat: usize,
    pub stack: Chips,
    pub round_bet: Chips,
    pub hand_bet: Chips,
    pub hole_cards: Vec<Card>,
    pub folded: bool,
    pub all_in: bool,
    pub in_hand: bool,
}

/// Seat views in a personalized snapshot: the recipient's own seat is
/// private, everyone else's is public.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SeatView {
    Private(PrivateSeatView),
    Public(PublicSeatView),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn deck_holds_52_distinct_cards() {
        let mut deck = Deck::new_shuffled();
        let mut seen = HashSet::new();
        for _ in 0..52 {
            assert!(seen.insert(deck.deal()));
        }
        assert_eq!(seen.len(), 52);
        assert_eq!(deck.remaining(), 0);
    }

    #[test]
    fn deck_burn_consumes_without_revealing() {
        let mut deck = Deck::new_shuffled();
        deck.burn();
        assert_eq!(deck.remaining(), 51);
        deck.deal();
        deck.burn();
        assert_eq!(deck.remaining(), 49);
    }

    #[test]
    fn deck_shuffle_restores_full_deck() {
        let mut deck = Deck::new_shuffled();
        for _ in 0..10 {
            deck.deal();
        }
        deck.shuffle();
        assert_eq!(deck.remaining(), 52);
    }

    #[test]
    fn wager_caps_at_stack_and_flips_all_in() {
        let mut seat = Seat::new(1, "alice".into(), 0, 100);
        seat.in_hand = true;
        assert_eq!(seat.wager(40), 40);
        assert_eq!(seat.stack, 60);
        assert!(!seat.all_in);
        assert_eq!(seat.wager(500), 60);
        assert_eq!(seat.stack, 0);
        assert!(seat.all_in);
        assert_eq!(seat.round_bet, 100);
        assert_eq!(seat.hand_bet, 100);
    }

    #[test]
    fn doubled_hole_cards_rejected() {
        let mut seat = Seat::new(1, "alice".into(), 0, 100);
        seat.deal_hole_cards(Card(14, Suit::Spade), Card(13, Suit::Spade))
            .unwrap();
        let err = seat
            .deal_hole_cards(Card(2, Suit::Club), Card(3, Suit::Club))
            .unwrap_err();
        assert!(matches!(err, HandError::InvariantViolation(_)));
    }

    #[test]
    fn new_street_clears_round_bet_only() {
        let mut seat = Seat::new(1, "alice".into(), 0, 100);
        seat.in_hand = true;
        seat.wager(30);
        seat.reset_for_new_street();
        assert_eq!(seat.round_bet, 0);
        assert_eq!(seat.hand_bet, 30);
        assert_eq!(seat.stack, 70);
    }

    #[test]
    fn broke_seat_sits_out_next_hand() {
        let mut seat = Seat::new(1, "alice".into(), 0, 50);
        seat.in_hand = true;
        seat.wager(50);
        seat.reset_for_new_hand();
        assert!(!seat.in_hand);
        assert!(!seat.all_in);
        assert_eq!(seat.hand_bet, 0);
    }

    #[test]
    fn action_parse_wire_forms() {
        assert_eq!(Action::parse("fold", None).unwrap(), Action::Fold);
        assert_eq!(Action::parse("bet", Some(40)).unwrap(), Action::Bet(40));
        assert_eq!(Action::parse("all-in", None).unwrap(), Action::AllIn);
        assert!(Action::parse("bet", None).is_err());
        assert!(Action::parse("raise", Some(-5)).is_err());
        assert!(Action::parse("raise", Some(i64::from(u32::MAX) + 1)).is_err());
        assert!(Action::parse("limp", None).is_err());
    }

    #[test]
    fn card_display_forms() {
        assert_eq!(Card(14, Suit::Spade).to_string(), "A♠");
        assert_eq!(Card(10, Suit::Heart).to_string(), "10♥");
        assert_eq!(Card(11, Suit::Club).to_string(), "J♣");
    }
}
