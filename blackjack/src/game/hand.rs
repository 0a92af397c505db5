//! Hand valuation with soft-ace handling.

use super::card::{Card, ACE};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a hand after valuation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandState {
    Live,
    Bust,
    /// 21 with exactly two cards.
    Blackjack,
    /// 21 with three or more cards.
    #[serde(rename = "TWENTYONE")]
    TwentyOne,
}

impl fmt::Display for HandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Live => "LIVE",
            Self::Bust => "BUST",
            Self::Blackjack => "BLACKJACK",
            Self::TwentyOne => "TWENTYONE",
        };
        write!(f, "{repr}")
    }
}

/// Sum the hand counting aces as 11, then demote aces to 1 one at a time
/// while the total exceeds 21. Returns the value and whether an ace is
/// still counted high (a soft hand).
fn calculate_value(cards: &[Card]) -> (u32, bool) {
    let mut value = 0;
    let mut high_aces = 0u32;
    for card in cards {
        if card.rank == ACE {
            high_aces += 1;
        }
        value += card.value();
    }
    while value > 21 && high_aces > 0 {
        value -= 10;
        high_aces -= 1;
    }
    (value, high_aces > 0)
}

/// An ordered set of cards owned by one player or the dealer.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Hand {
    cards: Vec<Card>,
}

impl Hand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, card: Card) {
        self.cards.push(card);
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn clear(&mut self) {
        self.cards.clear();
    }

    pub fn value(&self) -> u32 {
        calculate_value(&self.cards).0
    }

    /// A hand is soft while an ace is still counted as 11.
    pub fn is_soft(&self) -> bool {
        calculate_value(&self.cards).1
    }

    pub fn state(&self) -> HandState {
        match self.value() {
            21 if self.cards.len() == 2 => HandState::Blackjack,
            21 => HandState::TwentyOne,
            v if v > 21 => HandState::Bust,
            _ => HandState::Live,
        }
    }
}

impl FromIterator<Card> for Hand {
    fn from_iter<T: IntoIterator<Item = Card>>(iter: T) -> Self {
        Self {
            cards: iter.into_iter().collect(),
        }
    }
}
