//! Core library for the multi-table blackjack server: game rules, the
//! wire protocol, the persistent user store, and external-auth sessions.
//! The server binary owns the actors (connections, lobby, tables) that
//! drive these pieces.

pub mod auth;
pub mod game;
pub mod protocol;
pub mod store;

pub use game::{Game, GameError, GameRules, GameState, Outcome, RoundResult};
pub use protocol::{ClientCommand, Envelope, ProtocolError, ServerMessage};
pub use store::{Store, StoreError, UserRecord};
