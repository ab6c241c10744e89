//! End-to-end hand flows through the public `Hand` API: blinds, betting
//! rules, all-ins, and showdown accounting.

use chrono::Utc;
use holdem_core::game::entities::{Action, Chips, Stage};
use holdem_core::game::errors::HandError;
use holdem_core::game::hand::{Hand, HandConfig};

fn heads_up(stack: Chips) -> Hand {
    let mut hand = Hand::new(HandConfig::new(10, 20, stack));
    hand.add_seat(1, "alice", 0, stack).unwrap();
    hand.add_seat(2, "bob", 1, stack).unwrap();
    hand.start_hand(Utc::now()).unwrap();
    hand
}

/// Heads-up labels: the dealer posts the small blind and acts first.
fn small_blind_user(hand: &Hand) -> i64 {
    let dealer = hand.dealer_seat().unwrap();
    hand.seats()
        .iter()
        .find(|s| s.seat == dealer)
        .unwrap()
        .user_id
}

fn big_blind_user(hand: &Hand) -> i64 {
    let bb = hand.big_blind_seat().unwrap();
    hand.seats().iter().find(|s| s.seat == bb).unwrap().user_id
}

fn stack_of(hand: &Hand, user_id: i64) -> Chips {
    hand.seat_for_user(user_id).unwrap().stack
}

fn total_chips(hand: &Hand) -> Chips {
    hand.seats().iter().map(|s| s.stack).sum::<Chips>() + hand.pot()
}

#[test]
fn heads_up_preflop_call_check_reaches_flop() {
    let mut hand = heads_up(1_000);
    let sb = small_blind_user(&hand);
    let bb = big_blind_user(&hand);

    assert_eq!(hand.pot(), 30);
    assert_eq!(hand.current_bet(), 20);
    assert_eq!(hand.dealer_seat(), hand.small_blind_seat());
    assert_eq!(hand.current_seat(), hand.small_blind_seat());

    hand.apply_action(sb, Action::Call, Utc::now()).unwrap();
    assert_eq!(hand.pot(), 40);
    assert_eq!(stack_of(&hand, sb), 980);
    // The big blind keeps its option after a flat call.
    assert_eq!(hand.stage(), Stage::Preflop);

    hand.apply_action(bb, Action::Check, Utc::now()).unwrap();
    assert_eq!(hand.stage(), Stage::Flop);
    assert_eq!(hand.community().len(), 3);
    assert_eq!(hand.current_seat(), hand.small_blind_seat());
}

#[test]
fn minimum_bet_and_raise_enforcement() {
    let mut hand = heads_up(1_000);
    let sb = small_blind_user(&hand);
    let bb = big_blind_user(&hand);
    hand.apply_action(sb, Action::Call, Utc::now()).unwrap();
    hand.apply_action(bb, Action::Check, Utc::now()).unwrap();
    assert_eq!(hand.stage(), Stage::Flop);
    assert_eq!(hand.current_bet(), 0);

    let err = hand.apply_action(sb, Action::Bet(10), Utc::now()).unwrap_err();
    assert!(matches!(err, HandError::InvalidAction(reason) if reason == "Minimum bet is $20"));

    hand.apply_action(sb, Action::Bet(20), Utc::now()).unwrap();
    assert_eq!(hand.current_bet(), 20);

    hand.apply_action(bb, Action::Raise(100), Utc::now()).unwrap();
    assert_eq!(hand.current_bet(), 120);

    let err = hand
        .apply_action(sb, Action::Raise(50), Utc::now())
        .unwrap_err();
    assert!(matches!(err, HandError::InvalidAction(reason) if reason == "Minimum raise is $100"));

    hand.apply_action(sb, Action::Raise(100), Utc::now()).unwrap();
    assert_eq!(hand.current_bet(), 220);
}

#[test]
fn all_in_fold_win_completes_immediately() {
    let mut hand = heads_up(100);
    let sb = small_blind_user(&hand);
    let bb = big_blind_user(&hand);

    hand.apply_action(sb, Action::AllIn, Utc::now()).unwrap();
    assert_eq!(hand.current_bet(), 100);
    assert_eq!(hand.pot(), 120);

    let outcome = hand.apply_action(bb, Action::Fold, Utc::now()).unwrap();
    let summary = outcome.summary.expect("hand should complete");
    assert_eq!(hand.stage(), Stage::Complete);
    assert_eq!(summary.winners.len(), 1);
    assert_eq!(summary.winners[0].user_id, sb);
    assert_eq!(summary.winners[0].amount, 120);
    assert_eq!(stack_of(&hand, sb), 120);
    assert_eq!(stack_of(&hand, bb), 80);
}

#[test]
fn checked_down_hand_reaches_showdown() {
    let mut hand = heads_up(1_000);
    let sb = small_blind_user(&hand);
    let bb = big_blind_user(&hand);

    hand.apply_action(sb, Action::Call, Utc::now()).unwrap();
    hand.apply_action(bb, Action::Check, Utc::now()).unwrap();

    // Post-flop the small blind acts first on every street.
    for expected in [Stage::Turn, Stage::River, Stage::Complete] {
        hand.apply_action(sb, Action::Check, Utc::now()).unwrap();
        let outcome = hand.apply_action(bb, Action::Check, Utc::now()).unwrap();
        assert_eq!(hand.stage(), expected);
        if expected == Stage::Complete {
            let summary = outcome.summary.expect("showdown summary");
            assert!(!summary.winners.is_empty());
            assert!(summary.winners.iter().all(|w| w.rank.is_some()));
        }
    }

    assert_eq!(hand.community().len(), 5);
    // Pot of 40 splits evenly even on an exact tie, so nothing is lost.
    assert_eq!(
        hand.seats().iter().map(|s| s.stack).sum::<Chips>(),
        2_000
    );
}

#[test]
fn called_all_in_runs_out_the_board() {
    let mut hand = heads_up(500);
    let sb = small_blind_user(&hand);
    let bb = big_blind_user(&hand);

    hand.apply_action(sb, Action::AllIn, Utc::now()).unwrap();
    let outcome = hand.apply_action(bb, Action::AllIn, Utc::now()).unwrap();

    // Nobody can act: the board runs out with a burn before each street
    // and the hand shows down.
    let summary = outcome.summary.expect("hand should complete");
    assert_eq!(hand.stage(), Stage::Complete);
    assert_eq!(hand.community().len(), 5);
    assert_eq!(summary.pot, 1_000);
    assert_eq!(
        hand.seats().iter().map(|s| s.stack).sum::<Chips>(),
        1_000
    );
}

#[test]
fn folding_to_the_big_blind_awards_the_blinds() {
    let mut hand = heads_up(1_000);
    let sb = small_blind_user(&hand);
    let bb = big_blind_user(&hand);

    let outcome = hand.apply_action(sb, Action::Fold, Utc::now()).unwrap();
    let summary = outcome.summary.expect("hand should complete");
    assert_eq!(summary.winners[0].user_id, bb);
    assert_eq!(stack_of(&hand, bb), 1_010);
    assert_eq!(stack_of(&hand, sb), 990);
}

#[test]
fn pot_matches_contributions_at_every_step() {
    let mut hand = heads_up(1_000);
    let sb = small_blind_user(&hand);
    let bb = big_blind_user(&hand);
    let initial = total_chips(&hand);

    hand.apply_action(sb, Action::Call, Utc::now()).unwrap();
    assert_eq!(total_chips(&hand), initial);
    hand.apply_action(bb, Action::Check, Utc::now()).unwrap();
    assert_eq!(total_chips(&hand), initial);
    hand.apply_action(sb, Action::Bet(60), Utc::now()).unwrap();
    assert_eq!(total_chips(&hand), initial);
    hand.apply_action(bb, Action::Raise(120), Utc::now()).unwrap();
    assert_eq!(total_chips(&hand), initial);

    let round_bets: Chips = hand.seats().iter().map(|s| s.hand_bet).sum();
    assert_eq!(hand.pot(), round_bets);
}
