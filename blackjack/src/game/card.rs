//! Playing cards for a multi-deck blackjack shoe.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Card suit. Serialized lowercase on the wire (`"club"`, `"spade"`, ...).
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Club,
    Diamond,
    Heart,
    Spade,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Club, Suit::Diamond, Suit::Heart, Suit::Spade];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Club => "club",
            Self::Diamond => "diamond",
            Self::Heart => "heart",
            Self::Spade => "spade",
        };
        write!(f, "{repr}")
    }
}

/// Rank of the ace (counted 11 until the hand would bust).
pub const ACE: u8 = 1;
pub const JACK: u8 = 11;
pub const QUEEN: u8 = 12;
pub const KING: u8 = 13;

/// An immutable playing card. Rank runs 1 (ace) through 13 (king).
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Card {
    pub suit: Suit,
    pub rank: u8,
}

impl Card {
    pub const fn new(suit: Suit, rank: u8) -> Self {
        Self { suit, rank }
    }

    /// Blackjack pip value: faces count 10, aces count 11 here. The
    /// soft-ace demotion happens during hand valuation.
    pub fn value(&self) -> u32 {
        match self.rank {
            ACE => 11,
            r if r > 10 => 10,
            r => u32::from(r),
        }
    }

    pub fn rank_name(&self) -> &'static str {
        match self.rank {
            1 => "ace",
            2 => "two",
            3 => "three",
            4 => "four",
            5 => "five",
            6 => "six",
            7 => "seven",
            8 => "eight",
            9 => "nine",
            10 => "ten",
            11 => "jack",
            12 => "queen",
            13 => "king",
            _ => "unknown",
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}s", self.rank_name(), self.suit)
    }
}
