//! Multi-table blackjack server over websockets.
//!
//! Clients authenticate through a device-flow session, upgrade to a
//! socket, land in the lobby, and join tables. Each table is a
//! single-writer actor owning one game, its timers, and its broadcasts.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod server;
