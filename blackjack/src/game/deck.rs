//! Multi-deck shoe with discard tracking and a reshuffle threshold.

use super::card::{Card, Suit};
use super::errors::GameError;
use rand::seq::SliceRandom;
use std::collections::VecDeque;

pub const DEFAULT_DECK_COUNT: usize = 6;
pub const DEFAULT_CUT_LOCATION: usize = 150;

/// The draw pile plus discards. Cards drawn move to `used` until a shuffle
/// folds them back in, so `cards.len() + used.len()` stays constant.
#[derive(Clone, Debug)]
pub struct Shoe {
    cards: VecDeque<Card>,
    used: Vec<Card>,
    threshold: usize,
}

impl Shoe {
    /// Build a canonical ordered shoe of `num_decks` decks and shuffle it.
    /// Zero arguments fall back to the table defaults.
    pub fn new(num_decks: usize, threshold: usize) -> Self {
        let num_decks = if num_decks == 0 {
            DEFAULT_DECK_COUNT
        } else {
            num_decks
        };
        let threshold = if threshold == 0 {
            DEFAULT_CUT_LOCATION
        } else {
            threshold
        };

        let mut cards = Vec::with_capacity(52 * num_decks);
        for _ in 0..num_decks {
            for suit in Suit::ALL {
                for rank in 1..=13 {
                    cards.push(Card::new(suit, rank));
                }
            }
        }

        let mut shoe = Self {
            cards: cards.into(),
            used: Vec::new(),
            threshold,
        };
        shoe.shuffle();
        shoe
    }

    /// Build a shoe whose draw order is exactly `cards` (first element drawn
    /// first). Used to script rounds in tests.
    pub fn from_top(cards: Vec<Card>, threshold: usize) -> Self {
        Self {
            cards: cards.into(),
            used: Vec::new(),
            threshold,
        }
    }

    /// Draw the top card, moving it to the discard pile.
    pub fn draw(&mut self) -> Result<Card, GameError> {
        let card = self.cards.pop_front().ok_or(GameError::EmptyShoe)?;
        self.used.push(card);
        Ok(card)
    }

    /// True once the draw pile has shrunk past the cut card.
    pub fn needs_reshuffle(&self) -> bool {
        self.cards.len() < self.threshold
    }

    /// Fold the discards back in and permute uniformly (Fisher-Yates).
    pub fn shuffle(&mut self) {
        let mut all: Vec<Card> = self.cards.drain(..).collect();
        all.append(&mut self.used);
        all.shuffle(&mut rand::thread_rng());
        self.cards = all.into();
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    pub fn used(&self) -> usize {
        self.used.len()
    }
}

impl Default for Shoe {
    fn default() -> Self {
        Self::new(DEFAULT_DECK_COUNT, DEFAULT_CUT_LOCATION)
    }
}
