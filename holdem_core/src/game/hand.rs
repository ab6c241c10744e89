//! The authoritative hand state machine.
//!
//! A [`Hand`] owns everything that happens between the shuffle and the pot
//! award: blinds and antes, the action pointer, minimum-raise tracking,
//! street advancement with burn cards, timeout resolution, and showdown.
//! Illegal inputs come back as [`HandError`] values with a reason the
//! acting player can read; they never leave the hand half-mutated.
//!
//! The whole state serializes to bytes (`to_bytes`/`from_bytes`) so the
//! owning table session can persist it to the shared cache after every
//! transition and restore it with identical observable behavior.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::constants::{BOARD_SIZE, MAX_SEATS};
use super::entities::{Action, Card, Chips, Deck, Seat, SeatView, Stage};
use super::errors::{HandError, HandResult};
use super::evaluator::{self, HandRank};

/// Per-hand configuration. Carried inside the serialized state so a
/// restored hand keeps its blinds and deadline behavior.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HandConfig {
    pub small_blind: Chips,
    pub big_blind: Chips,
    /// Default stack for seats created without an explicit buy-in.
    pub initial_stack: Chips,
    /// Forced pre-blind contribution from every participating seat; zero
    /// disables antes.
    pub ante: Chips,
    pub action_timeout_secs: u64,
}

impl Default for HandConfig {
    fn default() -> Self {
        Self::new(10, 20, 1_000)
    }
}

impl HandConfig {
    pub const fn new(small_blind: Chips, big_blind: Chips, initial_stack: Chips) -> Self {
        Self {
            small_blind,
            big_blind,
            initial_stack,
            ante: 0,
            action_timeout_secs: 30,
        }
    }
}

/// How a mid-hand join was admitted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JoinStatus {
    /// Plays from the next hand.
    Ready,
    /// Sits out until the big blind reaches the seat.
    WaitingForBigBlind,
}

/// Net result for one seat across a completed hand.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SeatNet {
    pub user_id: i64,
    pub name: String,
    pub wagered: Chips,
    pub won: Chips,
}

/// One winner's share of the pot.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct WinnerShare {
    pub user_id: i64,
    pub name: String,
    pub amount: Chips,
    /// None when the pot was won without a showdown.
    pub rank: Option<HandRank>,
}

/// Record of a completed hand, handed to the session for hand-history
/// emission and the `hand_complete` broadcast.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HandSummary {
    pub pot: Chips,
    pub board: Vec<Card>,
    pub winners: Vec<WinnerShare>,
    pub seats: Vec<SeatNet>,
}

/// What an admitted action did to the hand.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionOutcome {
    pub street_advanced: bool,
    /// Present when the action ended the hand.
    pub summary: Option<HandSummary>,
}

impl ActionOutcome {
    fn none() -> Self {
        Self {
            street_advanced: false,
            summary: None,
        }
    }
}

/// An automatic resolution applied after the action deadline passed.
#[derive(Clone, Debug)]
pub struct TimeoutResolution {
    pub user_id: i64,
    pub name: String,
    pub action: Action,
    pub outcome: ActionOutcome,
}

/// Personalized snapshot of a hand. Only the recipient's seat carries
/// hole cards; every other seat shows a card count.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HandView {
    pub stage: Stage,
    pub community: Vec<Card>,
    pub pot: Chips,
    pub current_bet: Chips,
    /// Minimum increment for the next raise.
    pub min_raise: Chips,
    pub current_seat: Option<usize>,
    pub dealer_seat: Option<usize>,
    pub small_blind_seat: Option<usize>,
    pub big_blind_seat: Option<usize>,
    pub action_deadline: Option<DateTime<Utc>>,
    pub seats: Vec<SeatView>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Hand {
    pub config: HandConfig,
    deck: Deck,
    community: Vec<Card>,
    pot: Chips,
    stage: Stage,
    /// Seat number whose turn it is; None outside betting stages.
    current_seat: Option<usize>,
    current_bet: Chips,
    dealer: Option<usize>,
    small_blind_seat: Option<usize>,
    big_blind_seat: Option<usize>,
    last_aggressor: Option<usize>,
    last_raise_size: Chips,
    /// User ids that have acted in the current betting round.
    acted: BTreeSet<i64>,
    deadline: Option<DateTime<Utc>>,
    /// Seats ordered by seat number.
    seats: Vec<Seat>,
}

impl Hand {
    pub fn new(config: HandConfig) -> Self {
        Self {
            config,
            deck: Deck::new_shuffled(),
            community: Vec::with_capacity(BOARD_SIZE),
            pot: 0,
            stage: Stage::Waiting,
            current_seat: None,
            current_bet: 0,
            dealer: None,
            small_blind_seat: None,
            big_blind_seat: None,
            last_aggressor: None,
            last_raise_size: 0,
            acted: BTreeSet::new(),
            deadline: None,
            seats: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn pot(&self) -> Chips {
        self.pot
    }

    pub fn current_bet(&self) -> Chips {
        self.current_bet
    }

    pub fn community(&self) -> &[Card] {
        &self.community
    }

    pub fn current_seat(&self) -> Option<usize> {
        self.current_seat
    }

    pub fn dealer_seat(&self) -> Option<usize> {
        self.dealer
    }

    pub fn small_blind_seat(&self) -> Option<usize> {
        self.small_blind_seat
    }

    pub fn big_blind_seat(&self) -> Option<usize> {
        self.big_blind_seat
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn seat_for_user(&self, user_id: i64) -> Option<&Seat> {
        self.seats.iter().find(|s| s.user_id == user_id)
    }

    // ------------------------------------------------------------------
    // Seating
    // ------------------------------------------------------------------

    /// Add a seat. Between hands any free seat is admissible; mid-hand the
    /// seat comes in ready only at the next hand's big-blind position and
    /// otherwise waits for the big blind to reach it.
    pub fn add_seat(
        &mut self,
        user_id: i64,
        name: &str,
        seat_no: usize,
        stack: Chips,
    ) -> HandResult<JoinStatus> {
        if seat_no >= MAX_SEATS {
            return Err(HandError::InvalidInput(format!(
                "seat number must be below {MAX_SEATS}"
            )));
        }
        if self.seats.iter().any(|s| s.user_id == user_id) {
            return Err(HandError::AlreadySeated);
        }
        if self.seats.iter().any(|s| s.seat == seat_no) {
            return Err(HandError::SeatOccupied(seat_no));
        }
        if self.seats.len() >= MAX_SEATS {
            return Err(HandError::TableFull);
        }

        let mut seat = Seat::new(user_id, name.to_string(), seat_no, stack);
        let status = if self.stage.is_betting() {
            if self.next_big_blind_with(seat_no) == Some(seat_no) {
                JoinStatus::Ready
            } else {
                seat.waiting_for_big_blind = true;
                JoinStatus::WaitingForBigBlind
            }
        } else {
            JoinStatus::Ready
        };

        let at = self
            .seats
            .iter()
            .position(|s| s.seat > seat_no)
            .unwrap_or(self.seats.len());
        self.seats.insert(at, seat);
        Ok(status)
    }

    /// Remove a seat, folding it first when a hand is in progress. Returns
    /// the remaining stack (the caller reports the payout intent) and a
    /// summary when the departure ended the hand.
    pub fn remove_seat(
        &mut self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> HandResult<(Chips, Option<HandSummary>)> {
        let idx = self
            .seats
            .iter()
            .position(|s| s.user_id == user_id)
            .ok_or(HandError::UnknownSeat)?;

        let mut summary = None;
        if self.stage.is_betting() && self.seats[idx].in_hand {
            let seat_no = self.seats[idx].seat;
            let was_current = self.current_seat == Some(seat_no);
            self.seats[idx].fold();
            self.acted.remove(&user_id);
            let advance_from = if was_current { Some(seat_no) } else { None };
            summary = self.settle(advance_from, now)?.summary;
        }

        let idx = self
            .seats
            .iter()
            .position(|s| s.user_id == user_id)
            .ok_or(HandError::UnknownSeat)?;
        let seat = self.seats.remove(idx);
        Ok((seat.stack, summary))
    }

    /// Big-blind seat of the next hand if `candidate` were seated now: the
    /// button rotates over established seats, blind positions count the
    /// candidate.
    fn next_big_blind_with(&self, candidate: usize) -> Option<usize> {
        let established: Vec<usize> = self
            .seats
            .iter()
            .filter(|s| s.stack > 0 && !s.waiting_for_big_blind)
            .map(|s| s.seat)
            .collect();
        if established.len() < 2 {
            return Some(candidate);
        }
        let from = self.dealer.unwrap_or(established[0]);
        let next_dealer = next_in(&established, from);

        let mut pool = established;
        let at = pool
            .iter()
            .position(|&n| n > candidate)
            .unwrap_or(pool.len());
        pool.insert(at, candidate);
        let (_, bb) = blind_positions(&pool, next_dealer);
        Some(bb)
    }

    // ------------------------------------------------------------------
    // Hand lifecycle
    // ------------------------------------------------------------------

    /// Reinitialize and run the start-of-hand sequence. Returns a summary
    /// in the degenerate case where blinds and antes put everyone all-in
    /// and the hand runs out immediately.
    pub fn start_hand(&mut self, now: DateTime<Utc>) -> HandResult<Option<HandSummary>> {
        if self.stage.is_betting() || self.stage == Stage::Showdown {
            return Err(HandError::InvalidAction(
                "hand already in progress".to_string(),
            ));
        }

        self.deck.shuffle();
        self.community.clear();
        self.acted.clear();
        self.last_aggressor = None;
        self.last_raise_size = 0;
        self.pot = 0;
        self.current_bet = 0;
        for seat in &mut self.seats {
            seat.reset_for_new_hand();
        }

        let mut established: Vec<usize> = self
            .seats
            .iter()
            .filter(|s| s.in_hand && !s.waiting_for_big_blind)
            .map(|s| s.seat)
            .collect();
        if established.len() < 2 {
            // Short-handed: nobody is skipping blinds, so waiting seats
            // come straight in.
            for seat in &mut self.seats {
                if seat.in_hand {
                    seat.waiting_for_big_blind = false;
                }
            }
            established = self
                .seats
                .iter()
                .filter(|s| s.in_hand)
                .map(|s| s.seat)
                .collect();
        }
        if established.len() < 2 {
            self.stage = Stage::Waiting;
            return Err(HandError::NotEnoughSeats);
        }

        // The button moves before every hand, including the first.
        let from = self.dealer.unwrap_or(established[0]);
        let dealer = next_in(&established, from);

        // Seats waiting on the big blind join only when the big blind
        // lands on them; everyone else waiting stays out of this hand.
        let (small_blind, big_blind) = loop {
            let pool: Vec<usize> = self
                .seats
                .iter()
                .filter(|s| s.in_hand)
                .map(|s| s.seat)
                .collect();
            let (sb, bb) = blind_positions(&pool, dealer);
            if let Some(waiting) = self
                .seats
                .iter_mut()
                .find(|s| s.in_hand && s.waiting_for_big_blind && s.seat != bb)
            {
                waiting.in_hand = false;
                continue;
            }
            for seat in &mut self.seats {
                if seat.in_hand {
                    seat.waiting_for_big_blind = false;
                }
            }
            break (sb, bb);
        };

        self.dealer = Some(dealer);
        self.small_blind_seat = Some(small_blind);
        self.big_blind_seat = Some(big_blind);

        // Antes before blinds, capped at the stack like every other wager.
        if self.config.ante > 0 {
            let ante = self.config.ante;
            for seat in &mut self.seats {
                if seat.in_hand {
                    self.pot += seat.wager(ante);
                }
            }
        }

        let small = self.config.small_blind;
        let big = self.config.big_blind;
        let paid = self.seat_mut(small_blind)?.wager(small);
        self.pot += paid;
        let paid = self.seat_mut(big_blind)?.wager(big);
        self.pot += paid;

        // Two hole cards each, round-robin from the small blind. Blind
        // posts do not count as having acted: the big blind keeps its
        // option even after a flat call.
        let order = self.deal_order(small_blind);
        let firsts: Vec<Card> = order.iter().map(|_| self.deck.deal()).collect();
        for (first, &vec_idx) in firsts.into_iter().zip(order.iter()) {
            let second = self.deck.deal();
            self.seats[vec_idx].deal_hole_cards(first, second)?;
        }

        self.current_bet = big;
        self.last_raise_size = big;
        self.stage = Stage::Preflop;

        let in_hand_count = self.seats.iter().filter(|s| s.in_hand).count();
        let preferred = if in_hand_count == 2 {
            small_blind
        } else {
            self.next_seat_where(big_blind, |s| s.in_hand)
                .unwrap_or(small_blind)
        };
        match self.first_able_from(preferred) {
            Some(actor) => {
                self.current_seat = Some(actor);
                self.arm_deadline(now);
                Ok(None)
            }
            // Blinds and antes already have everyone all-in.
            None => Ok(self.advance_street(now)?.summary),
        }
    }

    /// Admit an action from a player. This is the only mutation entry
    /// point during a betting round; the timeout handler funnels through
    /// the same internal path.
    pub fn apply_action(
        &mut self,
        user_id: i64,
        action: Action,
        now: DateTime<Utc>,
    ) -> HandResult<ActionOutcome> {
        if !self.stage.is_betting() {
            return Err(HandError::InvalidAction(
                "No betting round in progress".to_string(),
            ));
        }
        let seat = self.seat_for_user(user_id).ok_or(HandError::UnknownSeat)?;
        let seat_no = seat.seat;
        if self.current_seat != Some(seat_no) {
            return Err(HandError::InvalidAction("Not your turn".to_string()));
        }
        if !seat.can_act() {
            return Err(HandError::InvalidAction(
                "You cannot act in this hand".to_string(),
            ));
        }
        if self.deadline.is_some_and(|d| now > d) {
            return Err(HandError::Timeout);
        }
        self.admit(seat_no, action, now)
    }

    /// Resolve an expired action deadline: auto-check when legal,
    /// otherwise auto-fold. Returns None while no deadline has expired.
    pub fn resolve_timeout(&mut self, now: DateTime<Utc>) -> HandResult<Option<TimeoutResolution>> {
        if !self.stage.is_betting() {
            return Ok(None);
        }
        let Some(deadline) = self.deadline else {
            return Ok(None);
        };
        if now <= deadline {
            return Ok(None);
        }
        let seat_no = self.current_seat.ok_or_else(|| {
            HandError::InvariantViolation("betting stage without an action pointer".to_string())
        })?;
        let seat = self.seat_ref(seat_no)?;
        let action = if seat.round_bet >= self.current_bet {
            Action::Check
        } else {
            Action::Fold
        };
        let user_id = seat.user_id;
        let name = seat.name.clone();
        let outcome = self.admit(seat_no, action, now)?;
        Ok(Some(TimeoutResolution {
            user_id,
            name,
            action,
            outcome,
        }))
    }

    // ------------------------------------------------------------------
    // Admission internals
    // ------------------------------------------------------------------

    fn admit(
        &mut self,
        seat_no: usize,
        action: Action,
        now: DateTime<Utc>,
    ) -> HandResult<ActionOutcome> {
        let big_blind = self.config.big_blind;
        let current_bet = self.current_bet;
        let min_raise = self.last_raise_size.max(big_blind);

        let (user_id, paid_to_pot) = {
            let seat = self.seat_ref(seat_no)?;
            let user_id = seat.user_id;

            // Validate before touching anything.
            match action {
                Action::Fold | Action::AllIn => {}
                Action::Check => {
                    if seat.round_bet < current_bet {
                        return Err(HandError::InvalidAction("Cannot check".to_string()));
                    }
                }
                Action::Call => {
                    if current_bet <= seat.round_bet {
                        return Err(HandError::InvalidAction(
                            "Nothing to call; check instead".to_string(),
                        ));
                    }
                }
                Action::Bet(amount) => {
                    if current_bet != 0 {
                        return Err(HandError::InvalidAction(
                            "Cannot bet; there is already a bet to match".to_string(),
                        ));
                    }
                    if amount == 0 {
                        return Err(HandError::InvalidInput(
                            "bet amount must be positive".to_string(),
                        ));
                    }
                    if amount < big_blind && amount < seat.stack {
                        return Err(HandError::InvalidAction(format!(
                            "Minimum bet is ${big_blind}"
                        )));
                    }
                }
                Action::Raise(amount) => {
                    if current_bet == 0 {
                        return Err(HandError::InvalidAction(
                            "Nothing to raise; bet instead".to_string(),
                        ));
                    }
                    if amount == 0 {
                        return Err(HandError::InvalidInput(
                            "raise amount must be positive".to_string(),
                        ));
                    }
                    let to_call = current_bet - seat.round_bet;
                    let pays_stack = seat.stack <= to_call.saturating_add(amount);
                    if amount < min_raise && !pays_stack {
                        return Err(HandError::InvalidAction(format!(
                            "Minimum raise is ${min_raise}"
                        )));
                    }
                }
            }

            let seat = self.seat_mut(seat_no)?;
            let paid = match action {
                Action::Fold => {
                    seat.fold();
                    0
                }
                Action::Check => 0,
                Action::Call => {
                    let to_call = current_bet - seat.round_bet;
                    seat.wager(to_call)
                }
                Action::Bet(amount) => seat.wager(amount),
                Action::Raise(amount) => {
                    let to_call = current_bet - seat.round_bet;
                    // Saturating like the validation above; `wager` caps
                    // at the stack anyway.
                    seat.wager(to_call.saturating_add(amount))
                }
                Action::AllIn => {
                    let stack = seat.stack;
                    seat.wager(stack)
                }
            };
            (user_id, paid)
        };
        self.pot += paid_to_pot;

        // Aggression bookkeeping. A wager that raises the match level by
        // at least the minimum increment reopens the action; a short
        // all-in raises the level without reopening.
        let new_level = self.seat_ref(seat_no)?.round_bet;
        match action {
            Action::Bet(_) => {
                self.current_bet = new_level;
                self.last_raise_size = new_level;
                self.last_aggressor = Some(seat_no);
                self.acted.clear();
                self.acted.insert(user_id);
            }
            Action::Raise(_) | Action::AllIn if new_level > current_bet => {
                let increment = new_level - current_bet;
                self.current_bet = new_level;
                if increment >= min_raise {
                    self.last_raise_size = increment;
                    self.last_aggressor = Some(seat_no);
                    self.acted.clear();
                }
                self.acted.insert(user_id);
            }
            _ => {
                self.acted.insert(user_id);
            }
        }

        self.settle(Some(seat_no), now)
    }

    /// Shared post-mutation resolution: fold-wins, round completion,
    /// action-pointer advancement.
    fn settle(
        &mut self,
        advance_from: Option<usize>,
        now: DateTime<Utc>,
    ) -> HandResult<ActionOutcome> {
        let contenders: Vec<usize> = self
            .seats
            .iter()
            .enumerate()
            .filter(|(_, s)| s.in_hand)
            .map(|(i, _)| i)
            .collect();
        match contenders.len() {
            0 => Err(HandError::InvariantViolation(
                "no seats left in the hand".to_string(),
            )),
            1 => self.award_fold_win(contenders[0]),
            _ => {
                if self.round_complete() {
                    self.advance_street(now)
                } else {
                    if let Some(from) = advance_from {
                        let next = self.next_seat_where(from, Seat::can_act).ok_or_else(|| {
                            HandError::InvariantViolation(
                                "open betting round with nobody to act".to_string(),
                            )
                        })?;
                        self.current_seat = Some(next);
                        self.arm_deadline(now);
                    }
                    Ok(ActionOutcome::none())
                }
            }
        }
    }

    fn round_complete(&self) -> bool {
        self.seats
            .iter()
            .filter(|s| s.can_act())
            .all(|s| s.round_bet == self.current_bet && self.acted.contains(&s.user_id))
    }

    fn advance_street(&mut self, now: DateTime<Utc>) -> HandResult<ActionOutcome> {
        for seat in &mut self.seats {
            seat.reset_for_new_street();
        }
        self.current_bet = 0;
        self.last_aggressor = None;
        self.last_raise_size = 0;
        self.acted.clear();
        self.current_seat = None;
        self.deadline = None;

        let able = self.seats.iter().filter(|s| s.can_act()).count();
        if able <= 1 {
            // Betting is over for good; run the board out and show down.
            while self.community.len() < BOARD_SIZE {
                self.deal_board();
            }
            return self.showdown();
        }
        if self.stage == Stage::River {
            return self.showdown();
        }

        self.deal_board();
        let small_blind = self.small_blind_seat.ok_or_else(|| {
            HandError::InvariantViolation("street advance without blind positions".to_string())
        })?;
        match self.first_able_from(small_blind) {
            Some(actor) => {
                self.current_seat = Some(actor);
                self.arm_deadline(now);
                Ok(ActionOutcome {
                    street_advanced: true,
                    summary: None,
                })
            }
            None => {
                while self.community.len() < BOARD_SIZE {
                    self.deal_board();
                }
                self.showdown()
            }
        }
    }

    /// Burn one card, then deal the next board installment (3/1/1).
    fn deal_board(&mut self) {
        self.deck.burn();
        let count = if self.community.is_empty() { 3 } else { 1 };
        for _ in 0..count {
            self.community.push(self.deck.deal());
        }
        self.stage = match self.community.len() {
            3 => Stage::Flop,
            4 => Stage::Turn,
            _ => Stage::River,
        };
    }

    fn showdown(&mut self) -> HandResult<ActionOutcome> {
        self.stage = Stage::Showdown;
        self.current_seat = None;
        self.deadline = None;

        let mut ranked: Vec<(usize, evaluator::HandStrength)> = Vec::new();
        for (idx, seat) in self.seats.iter().enumerate() {
            if !seat.in_hand {
                continue;
            }
            let mut cards = seat.hole_cards.clone();
            cards.extend_from_slice(&self.community);
            ranked.push((idx, evaluator::evaluate(&cards)?));
        }
        let best = ranked
            .iter()
            .map(|(_, s)| s.clone())
            .max()
            .ok_or_else(|| {
                HandError::InvariantViolation("showdown with no contenders".to_string())
            })?;
        let winner_idxs: Vec<usize> = ranked
            .iter()
            .filter(|(_, s)| *s == best)
            .map(|(i, _)| *i)
            .collect();

        // Single pot, floor split; the integer remainder is dropped
        // rather than redistributed.
        let share = self.pot / winner_idxs.len() as Chips;
        let mut winners = Vec::with_capacity(winner_idxs.len());
        for &idx in &winner_idxs {
            let seat = &mut self.seats[idx];
            seat.add_chips(share);
            winners.push(WinnerShare {
                user_id: seat.user_id,
                name: seat.name.clone(),
                amount: share,
                rank: Some(best.rank),
            });
        }

        let summary = self.build_summary(winners);
        self.stage = Stage::Complete;
        Ok(ActionOutcome {
            street_advanced: false,
            summary: Some(summary),
        })
    }

    fn award_fold_win(&mut self, winner_idx: usize) -> HandResult<ActionOutcome> {
        let amount = self.pot;
        let seat = &mut self.seats[winner_idx];
        seat.add_chips(amount);
        let winners = vec![WinnerShare {
            user_id: seat.user_id,
            name: seat.name.clone(),
            amount,
            rank: None,
        }];
        let summary = self.build_summary(winners);
        self.stage = Stage::Complete;
        self.current_seat = None;
        self.deadline = None;
        Ok(ActionOutcome {
            street_advanced: false,
            summary: Some(summary),
        })
    }

    fn build_summary(&self, winners: Vec<WinnerShare>) -> HandSummary {
        let seats = self
            .seats
            .iter()
            .map(|s| SeatNet {
                user_id: s.user_id,
                name: s.name.clone(),
                wagered: s.hand_bet,
                won: winners
                    .iter()
                    .find(|w| w.user_id == s.user_id)
                    .map(|w| w.amount)
                    .unwrap_or(0),
            })
            .collect();
        HandSummary {
            pot: self.pot,
            board: self.community.clone(),
            winners,
            seats,
        }
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    pub fn to_bytes(&self) -> HandResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> HandResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub fn view_for(&self, user_id: i64) -> HandView {
        HandView {
            stage: self.stage,
            community: self.community.clone(),
            pot: self.pot,
            current_bet: self.current_bet,
            min_raise: self.last_raise_size.max(self.config.big_blind),
            current_seat: self.current_seat,
            dealer_seat: self.dealer,
            small_blind_seat: self.small_blind_seat,
            big_blind_seat: self.big_blind_seat,
            action_deadline: self.deadline,
            seats: self
                .seats
                .iter()
                .map(|s| {
                    if s.user_id == user_id {
                        SeatView::Private(s.private_view())
                    } else {
                        SeatView::Public(s.public_view())
                    }
                })
                .collect(),
        }
    }

    // ------------------------------------------------------------------
    // Position helpers
    // ------------------------------------------------------------------

    fn seat_ref(&self, seat_no: usize) -> HandResult<&Seat> {
        self.seats
            .iter()
            .find(|s| s.seat == seat_no)
            .ok_or(HandError::UnknownSeat)
    }

    fn seat_mut(&mut self, seat_no: usize) -> HandResult<&mut Seat> {
        self.seats
            .iter_mut()
            .find(|s| s.seat == seat_no)
            .ok_or(HandError::UnknownSeat)
    }

    /// First seat matching `pred` strictly after `after` in circular seat
    /// order; `after` itself is considered last.
    fn next_seat_where<F>(&self, after: usize, pred: F) -> Option<usize>
    where
        F: Fn(&Seat) -> bool,
    {
        let numbers: Vec<usize> = self.seats.iter().map(|s| s.seat).collect();
        if numbers.is_empty() {
            return None;
        }
        let start = numbers
            .iter()
            .position(|&n| n > after)
            .unwrap_or(0);
        for k in 0..numbers.len() {
            let n = numbers[(start + k) % numbers.len()];
            let seat = self.seats.iter().find(|s| s.seat == n)?;
            if pred(seat) {
                return Some(n);
            }
        }
        None
    }

    /// First able seat starting at `from` inclusive.
    fn first_able_from(&self, from: usize) -> Option<usize> {
        if self.seat_ref(from).map(Seat::can_act).unwrap_or(false) {
            return Some(from);
        }
        self.next_seat_where(from, Seat::can_act)
    }

    /// Deal order as indices into `seats`, circular from the small blind,
    /// participating seats only.
    fn deal_order(&self, small_blind: usize) -> Vec<usize> {
        let mut order: Vec<usize> = Vec::with_capacity(self.seats.len());
        let start = self
            .seats
            .iter()
            .position(|s| s.seat == small_blind)
            .unwrap_or(0);
        for k in 0..self.seats.len() {
            let idx = (start + k) % self.seats.len();
            if self.seats[idx].in_hand {
                order.push(idx);
            }
        }
        order
    }

    fn arm_deadline(&mut self, now: DateTime<Utc>) {
        self.deadline = Some(now + Duration::seconds(self.config.action_timeout_secs as i64));
    }
}

/// Next seat number in `pool` (sorted) after `after`, wrapping.
fn next_in(pool: &[usize], after: usize) -> usize {
    pool.iter()
        .find(|&&n| n > after)
        .copied()
        .unwrap_or(pool[0])
}

/// Small- and big-blind positions for `pool` (sorted, >= 2 seats) given
/// the dealer. Heads-up the dealer posts the small blind.
fn blind_positions(pool: &[usize], dealer: usize) -> (usize, usize) {
    if pool.len() == 2 {
        let other = pool.iter().find(|&&n| n != dealer).copied().unwrap_or(dealer);
        (dealer, other)
    } else {
        let sb = next_in(pool, dealer);
        let bb = next_in(pool, sb);
        (sb, bb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn two_player_hand(stack: Chips) -> Hand {
        let mut hand = Hand::new(HandConfig::new(10, 20, stack));
        hand.add_seat(1, "alice", 0, stack).unwrap();
        hand.add_seat(2, "bob", 1, stack).unwrap();
        hand
    }

    fn dealer_user(hand: &Hand) -> i64 {
        let dealer = hand.dealer_seat().unwrap();
        hand.seats().iter().find(|s| s.seat == dealer).unwrap().user_id
    }

    fn other_user(hand: &Hand, user: i64) -> i64 {
        hand.seats()
            .iter()
            .find(|s| s.user_id != user)
            .unwrap()
            .user_id
    }

    #[test]
    fn start_hand_posts_blinds_and_sets_pointer() {
        let mut hand = two_player_hand(1_000);
        hand.start_hand(now()).unwrap();

        assert_eq!(hand.stage(), Stage::Preflop);
        assert_eq!(hand.pot(), 30);
        assert_eq!(hand.current_bet(), 20);
        // Heads-up: the dealer posts the small blind and acts first.
        assert_eq!(hand.dealer_seat(), hand.small_blind_seat());
        assert_eq!(hand.current_seat(), hand.small_blind_seat());
        assert!(hand.deadline().is_some());
        for seat in hand.seats() {
            assert_eq!(seat.hole_cards.len(), 2);
        }
    }

    #[test]
    fn start_hand_needs_two_funded_seats() {
        let mut hand = Hand::new(HandConfig::default());
        hand.add_seat(1, "alice", 0, 500).unwrap();
        assert!(matches!(
            hand.start_hand(now()),
            Err(HandError::NotEnoughSeats)
        ));
        assert_eq!(hand.stage(), Stage::Waiting);
    }

    #[test]
    fn dealer_rotates_uniformly_from_hand_one() {
        let mut hand = two_player_hand(100_000);
        let mut dealers = Vec::new();
        for _ in 0..4 {
            hand.start_hand(now()).unwrap();
            dealers.push(hand.dealer_seat().unwrap());
            // Fold out the hand so the next one can start.
            let sb_user = dealer_user(&hand);
            hand.apply_action(sb_user, Action::Fold, now()).unwrap();
        }
        assert_eq!(dealers, vec![1, 0, 1, 0]);
    }

    #[test]
    fn out_of_turn_action_rejected() {
        let mut hand = two_player_hand(1_000);
        hand.start_hand(now()).unwrap();
        let bb_user = other_user(&hand, dealer_user(&hand));
        let err = hand.apply_action(bb_user, Action::Call, now()).unwrap_err();
        assert!(matches!(err, HandError::InvalidAction(reason) if reason == "Not your turn"));
    }

    #[test]
    fn replayed_action_rejected_second_time() {
        let mut hand = two_player_hand(1_000);
        hand.start_hand(now()).unwrap();
        let sb_user = dealer_user(&hand);
        hand.apply_action(sb_user, Action::Call, now()).unwrap();
        let err = hand.apply_action(sb_user, Action::Call, now()).unwrap_err();
        assert!(matches!(err, HandError::InvalidAction(reason) if reason == "Not your turn"));
    }

    #[test]
    fn expired_deadline_blocks_direct_actions() {
        let mut hand = two_player_hand(1_000);
        let started = now();
        hand.start_hand(started).unwrap();
        let sb_user = dealer_user(&hand);
        let late = started + Duration::seconds(hand.config.action_timeout_secs as i64 + 5);
        let err = hand.apply_action(sb_user, Action::Call, late).unwrap_err();
        assert!(matches!(err, HandError::Timeout));
    }

    #[test]
    fn timeout_auto_checks_when_matched() {
        let mut hand = two_player_hand(1_000);
        let started = now();
        hand.start_hand(started).unwrap();
        let sb_user = dealer_user(&hand);
        hand.apply_action(sb_user, Action::Call, started).unwrap();

        // Big blind is matched; letting the clock run should check it
        // through to the flop.
        let late = started + Duration::seconds(hand.config.action_timeout_secs as i64 + 1);
        let resolution = hand.resolve_timeout(late).unwrap().unwrap();
        assert_eq!(resolution.action, Action::Check);
        assert!(resolution.outcome.street_advanced);
        assert_eq!(hand.stage(), Stage::Flop);
    }

    #[test]
    fn timeout_auto_folds_when_facing_a_bet() {
        let mut hand = two_player_hand(1_000);
        let started = now();
        hand.start_hand(started).unwrap();

        // Small blind faces the big blind and times out.
        let late = started + Duration::seconds(hand.config.action_timeout_secs as i64 + 1);
        let resolution = hand.resolve_timeout(late).unwrap().unwrap();
        assert_eq!(resolution.action, Action::Fold);
        assert_eq!(hand.stage(), Stage::Complete);
        let summary = resolution.outcome.summary.unwrap();
        assert_eq!(summary.winners.len(), 1);
        assert_eq!(summary.winners[0].amount, 30);
    }

    #[test]
    fn pot_tracks_seat_contributions() {
        let mut hand = two_player_hand(1_000);
        hand.start_hand(now()).unwrap();
        let sb_user = dealer_user(&hand);
        let bb_user = other_user(&hand, sb_user);
        hand.apply_action(sb_user, Action::Call, now()).unwrap();
        hand.apply_action(bb_user, Action::Check, now()).unwrap();
        hand.apply_action(sb_user, Action::Bet(40), now()).unwrap();

        let contributed: Chips = hand.seats().iter().map(|s| s.hand_bet).sum();
        assert_eq!(hand.pot(), contributed);
    }

    #[test]
    fn street_boundaries_have_matched_bets() {
        let mut hand = two_player_hand(1_000);
        hand.start_hand(now()).unwrap();
        let sb_user = dealer_user(&hand);
        let bb_user = other_user(&hand, sb_user);
        hand.apply_action(sb_user, Action::Call, now()).unwrap();
        hand.apply_action(bb_user, Action::Check, now()).unwrap();
        assert_eq!(hand.stage(), Stage::Flop);
        for seat in hand.seats().iter().filter(|s| s.can_act()) {
            assert_eq!(seat.round_bet, hand.current_bet());
        }
        assert_eq!(hand.current_bet(), 0);
    }

    #[test]
    fn all_in_meeting_minimum_increment_reopens_action() {
        let mut hand = Hand::new(HandConfig::new(10, 20, 1_000));
        hand.add_seat(1, "alice", 0, 1_000).unwrap();
        hand.add_seat(2, "bob", 1, 1_000).unwrap();
        hand.add_seat(3, "carol", 2, 45).unwrap();
        hand.start_hand(now()).unwrap();

        // Hand 1 geometry: dealer seat 1, SB seat 2 (carol), BB seat 0,
        // first to act seat 1.
        assert_eq!(hand.dealer_seat(), Some(1));
        assert_eq!(hand.small_blind_seat(), Some(2));
        assert_eq!(hand.big_blind_seat(), Some(0));
        assert_eq!(hand.current_seat(), Some(1));

        hand.apply_action(2, Action::Call, now()).unwrap();
        // Carol's 45 total is a 25-chip increment over the 20 level,
        // above the minimum raise of 20: a real raise that reopens.
        hand.apply_action(3, Action::AllIn, now()).unwrap();
        assert_eq!(hand.current_bet(), 45);
        assert_eq!(hand.view_for(1).min_raise, 25);

        // Both remaining seats must act again before the flop.
        hand.apply_action(1, Action::Call, now()).unwrap();
        assert_eq!(hand.stage(), Stage::Preflop);
        hand.apply_action(2, Action::Call, now()).unwrap();
        assert_eq!(hand.stage(), Stage::Flop);
    }

    #[test]
    fn short_all_in_raises_level_without_reopening() {
        let mut hand = Hand::new(HandConfig::new(10, 20, 1_000));
        hand.add_seat(1, "alice", 0, 1_000).unwrap();
        hand.add_seat(2, "bob", 1, 1_000).unwrap();
        hand.add_seat(3, "carol", 2, 30).unwrap();
        hand.start_hand(now()).unwrap();

        hand.apply_action(2, Action::Call, now()).unwrap();
        // Carol's 30 total is only a 10-chip increment: the level moves
        // but the minimum raise does not.
        hand.apply_action(3, Action::AllIn, now()).unwrap();
        assert_eq!(hand.current_bet(), 30);
        assert_eq!(hand.view_for(1).min_raise, 20);

        let err = hand.apply_action(1, Action::Raise(15), now()).unwrap_err();
        assert!(matches!(err, HandError::InvalidAction(reason) if reason == "Minimum raise is $20"));

        hand.apply_action(1, Action::Call, now()).unwrap();
        hand.apply_action(2, Action::Call, now()).unwrap();
        assert_eq!(hand.stage(), Stage::Flop);
    }

    #[test]
    fn oversized_raise_saturates_to_all_in() {
        let mut hand = two_player_hand(1_000);
        hand.start_hand(now()).unwrap();
        let sb_user = dealer_user(&hand);
        let bb_user = other_user(&hand, sb_user);
        hand.apply_action(sb_user, Action::Call, now()).unwrap();
        hand.apply_action(bb_user, Action::Check, now()).unwrap();
        hand.apply_action(sb_user, Action::Bet(20), now()).unwrap();

        // A raise amount near Chips::MAX must not wrap the wagered total;
        // it just puts the seat all-in.
        hand.apply_action(bb_user, Action::Raise(Chips::MAX), now())
            .unwrap();
        let bb = hand.seat_for_user(bb_user).unwrap();
        assert!(bb.all_in);
        assert_eq!(bb.stack, 0);
        assert_eq!(hand.current_bet(), 980);

        let contributed: Chips = hand.seats().iter().map(|s| s.hand_bet).sum();
        assert_eq!(hand.pot(), contributed);
    }

    #[test]
    fn serialization_round_trips() {
        let mut hand = two_player_hand(1_000);
        hand.start_hand(now()).unwrap();
        let sb_user = dealer_user(&hand);
        hand.apply_action(sb_user, Action::Call, now()).unwrap();

        let bytes = hand.to_bytes().unwrap();
        let restored = Hand::from_bytes(&bytes).unwrap();
        assert_eq!(hand, restored);

        // The restored hand accepts the same next action.
        let bb_user = other_user(&hand, sb_user);
        let mut a = hand.clone();
        let mut b = restored;
        a.apply_action(bb_user, Action::Check, now()).unwrap();
        b.apply_action(bb_user, Action::Check, now()).unwrap();
        assert_eq!(a.stage(), b.stage());
        assert_eq!(a.community(), b.community());
    }

    #[test]
    fn garbage_bytes_are_a_hard_error() {
        assert!(Hand::from_bytes(&[0xde, 0xad, 0xbe, 0xef]).is_err());
    }

    #[test]
    fn mid_hand_join_at_next_big_blind_is_ready() {
        let mut hand = two_player_hand(1_000);
        // Hand 1: dealer seat 1, so next hand's rotation puts the dealer
        // on seat 0 and the big blind of {0, 1, 2} on seat 2.
        hand.start_hand(now()).unwrap();
        assert_eq!(hand.dealer_seat(), Some(1));

        let status = hand.add_seat(3, "carol", 2, 1_000).unwrap();
        assert_eq!(status, JoinStatus::Ready);
        assert!(!hand.seat_for_user(3).unwrap().waiting_for_big_blind);
    }

    #[test]
    fn mid_hand_join_away_from_big_blind_waits() {
        let mut hand = two_player_hand(1_000);
        hand.start_hand(now()).unwrap();
        let sb_user = dealer_user(&hand);
        hand.apply_action(sb_user, Action::Fold, now()).unwrap();

        // Hand 2: dealer seat 0, so the next rotation makes seat 1 the
        // dealer and the big blind of {0, 1, 2} lands on seat 0.
        hand.start_hand(now()).unwrap();
        assert_eq!(hand.dealer_seat(), Some(0));

        let status = hand.add_seat(3, "carol", 2, 1_000).unwrap();
        assert_eq!(status, JoinStatus::WaitingForBigBlind);
        let carol = hand.seat_for_user(3).unwrap();
        assert!(carol.waiting_for_big_blind);
        assert!(!carol.in_hand);
    }

    #[test]
    fn waiting_seat_enters_when_big_blind_reaches_it() {
        let mut hand = two_player_hand(1_000);
        hand.start_hand(now()).unwrap();
        let sb_user = dealer_user(&hand);
        hand.apply_action(sb_user, Action::Fold, now()).unwrap();

        // Carol joins between hands 1 and 2... but mid-hand for hand 2.
        hand.start_hand(now()).unwrap();
        hand.add_seat(3, "carol", 2, 1_000).unwrap();
        assert!(hand.seat_for_user(3).unwrap().waiting_for_big_blind);
        let sb_user = dealer_user(&hand);
        hand.apply_action(sb_user, Action::Fold, now()).unwrap();

        // Hand 3 stays heads-up: blinds over {0, 1, 2} with dealer 1
        // would put the big blind on seat 0, so carol keeps waiting.
        hand.start_hand(now()).unwrap();
        assert_eq!(hand.dealer_seat(), Some(1));
        assert!(!hand.seat_for_user(3).unwrap().in_hand);
        let sb_user = dealer_user(&hand);
        hand.apply_action(sb_user, Action::Fold, now()).unwrap();

        // Hand 4: dealer 0, big blind over {0, 1, 2} lands on seat 2 and
        // carol is dealt in.
        hand.start_hand(now()).unwrap();
        assert_eq!(hand.dealer_seat(), Some(0));
        assert_eq!(hand.big_blind_seat(), Some(2));
        let carol = hand.seat_for_user(3).unwrap();
        assert!(carol.in_hand);
        assert!(!carol.waiting_for_big_blind);
    }

    #[test]
    fn between_hands_any_seat_is_admissible() {
        let mut hand = two_player_hand(1_000);
        assert_eq!(hand.add_seat(3, "carol", 5, 1_000).unwrap(), JoinStatus::Ready);
        assert!(matches!(
            hand.add_seat(4, "dave", 5, 1_000),
            Err(HandError::SeatOccupied(5))
        ));
        assert!(matches!(
            hand.add_seat(1, "alice", 6, 1_000),
            Err(HandError::AlreadySeated)
        ));
    }

    #[test]
    fn leaving_mid_hand_folds_the_seat() {
        let mut hand = two_player_hand(1_000);
        hand.start_hand(now()).unwrap();
        let sb_user = dealer_user(&hand);
        let bb_user = other_user(&hand, sb_user);

        let (refund, summary) = hand.remove_seat(sb_user, now()).unwrap();
        assert_eq!(refund, 990);
        let summary = summary.unwrap();
        assert_eq!(summary.winners[0].user_id, bb_user);
        assert_eq!(hand.stage(), Stage::Complete);
        assert!(hand.seat_for_user(sb_user).is_none());
    }
}
