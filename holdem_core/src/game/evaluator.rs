//! Best-five-of-seven hand evaluation.
//!
//! `evaluate` enumerates every 5-card subset of the input (at most
//! C(7,5) = 21 for a full board) and keeps the strongest. Strengths are
//! totally ordered: category first, then the category's tiebreaker values
//! compared lexicographically, so ranking seats at showdown is a plain
//! `max`/`sort`.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::entities::{Card, Value};
use super::errors::HandError;

/// Hand categories, weakest to strongest. A royal flush is the straight
/// flush with a ten-high ordering value of 14; it needs no label of its
/// own to order correctly.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum HandRank {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
}

impl fmt::Display for HandRank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::HighCard => "high card",
            Self::OnePair => "one pair",
            Self::TwoPair => "two pair",
            Self::ThreeOfAKind => "three of a kind",
            Self::Straight => "straight",
            Self::Flush => "flush",
            Self::FullHouse => "full house",
            Self::FourOfAKind => "four of a kind",
            Self::StraightFlush => "straight flush",
        };
        write!(f, "{repr}")
    }
}

/// A ranked five-card hand. Derived `Ord` compares the rank first and the
/// tiebreaker vector lexicographically, which matches the category table:
///
/// | category        | tiebreakers                       |
/// |-----------------|-----------------------------------|
/// | straight flush  | top card                          |
/// | four of a kind  | quad value, kicker                |
/// | full house      | trip value, pair value            |
/// | flush           | five values descending            |
/// | straight        | top card (wheel tops out at 5)    |
/// | three of a kind | trip value, two kickers           |
/// | two pair        | high pair, low pair, kicker       |
/// | one pair        | pair value, three kickers         |
/// | high card       | five values descending            |
#[derive(Clone, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct HandStrength {
    pub rank: HandRank,
    pub tiebreakers: Vec<Value>,
}

impl fmt::Display for HandStrength {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.rank)
    }
}

/// Rank the best five-card hand available in `cards`.
///
/// Accepts five, six, or seven cards (two hole cards plus any visible
/// board). Fewer than five is an error.
pub fn evaluate(cards: &[Card]) -> Result<HandStrength, HandError> {
    if cards.len() < 5 {
        return Err(HandError::InvalidInput(format!(
            "hand evaluation needs at least 5 cards, got {}",
            cards.len()
        )));
    }

    let n = cards.len();
    let mut best: Option<HandStrength> = None;
    let mut picked = [Card(2, super::entities::Suit::Club); 5];

    // Every 5-subset as a bitmask; n <= 7 keeps this tiny.
    for mask in 0u32..(1 << n) {
        if mask.count_ones() != 5 {
            continue;
        }
        let mut k = 0;
        for (i, card) in cards.iter().enumerate() {
            if mask & (1 << i) != 0 {
                picked[k] = *card;
                k += 1;
            }
        }
        let strength = classify_five(&picked);
        if best.as_ref().is_none_or(|b| strength > *b) {
            best = Some(strength);
        }
    }

    Ok(best.expect("at least one 5-card subset"))
}

/// Classify exactly five cards.
fn classify_five(cards: &[Card; 5]) -> HandStrength {
    let mut values: Vec<Value> = cards.iter().map(|c| c.0).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));

    let is_flush = cards.iter().all(|c| c.1 == cards[0].1);
    let straight_top = straight_top(&values);

    if let Some(top) = straight_top {
        return HandStrength {
            rank: if is_flush {
                HandRank::StraightFlush
            } else {
                HandRank::Straight
            },
            tiebreakers: vec![top],
        };
    }

    // Group values by multiplicity: counts[v] = occurrences of v.
    let mut counts = [0u8; 15];
    for &v in &values {
        counts[v as usize] += 1;
    }

    // Distinct values ordered by (count desc, value desc) drive every
    // paired category's tiebreakers.
    let mut groups: Vec<(u8, Value)> = Vec::with_capacity(5);
    for v in (2..=14u8).rev() {
        if counts[v as usize] > 0 {
            groups.push((counts[v as usize], v));
        }
    }
    groups.sort_unstable_by(|a, b| b.cmp(a));

    let tiebreakers = |groups: &[(u8, Value)]| -> Vec<Value> {
        groups.iter().map(|&(_, v)| v).collect()
    };

    match (groups[0].0, groups.get(1).map(|g| g.0).unwrap_or(0)) {
        (4, _) => HandStrength {
            rank: HandRank::FourOfAKind,
            tiebreakers: tiebreakers(&groups),
        },
        (3, 2) => HandStrength {
            rank: HandRank::FullHouse,
            tiebreakers: tiebreakers(&groups),
        },
        (3, _) => HandStrength {
            rank: HandRank::ThreeOfAKind,
            tiebreakers: tiebreakers(&groups),
        },
        (2, 2) => HandStrength {
            rank: HandRank::TwoPair,
            tiebreakers: tiebreakers(&groups),
        },
        (2, _) => HandStrength {
            rank: HandRank::OnePair,
            tiebreakers: tiebreakers(&groups),
        },
        _ => HandStrength {
            rank: if is_flush {
                HandRank::Flush
            } else {
                HandRank::HighCard
            },
            tiebreakers: values,
        },
    }
}

/// Top card of a straight formed by `values` (sorted descending), or None.
/// The wheel A-2-3-4-5 reports a top of 5.
fn straight_top(values: &[Value]) -> Option<Value> {
    if values.windows(2).all(|w| w[0] == w[1] + 1) {
        return Some(values[0]);
    }
    // Wheel: ace plays low.
    if values == [14, 5, 4, 3, 2] {
        return Some(5);
    }
    None
}
