//! Game rule errors.

use super::round::GameState;
use thiserror::Error;

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum GameError {
    #[error("{op} cannot be run from state {state}")]
    InvalidState { op: &'static str, state: GameState },
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("table is full")]
    TableFull,
    #[error("player is not seated at this table")]
    NotSeated,
    #[error("invalid bet: {0}")]
    InvalidBet(String),
    #[error("shoe is empty")]
    EmptyShoe,
    #[error("no active player has bet")]
    NoActiveBets,
}
