//! Seated players and their connection lifecycle.

use super::errors::GameError;
use super::hand::Hand;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How long a disconnected player keeps their seat and wallet.
pub const DISCONNECT_GRACE: Duration = Duration::minutes(3);

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerState {
    Betting,
    BetsMade,
    WaitingForAction,
    PlayingTurn,
    Done,
    /// Sitting this round out (no bet when it started, or mid-round join).
    Inactive,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Betting => "BETTING",
            Self::BetsMade => "BETS_MADE",
            Self::WaitingForAction => "WAITING_FOR_ACTION",
            Self::PlayingTurn => "PLAYING_TURN",
            Self::Done => "DONE",
            Self::Inactive => "INACTIVE",
        };
        write!(f, "{repr}")
    }
}

/// One seat's occupant. Mutated only by the owning table actor.
#[derive(Clone, Debug)]
pub struct Player {
    pub id: Uuid,
    pub name: String,
    pub state: PlayerState,
    /// Chips staked this round.
    pub bet: i64,
    /// Session bankroll, seeded from the user store on first seat.
    pub wallet: i64,
    pub hand: Hand,
    pub connected_at: DateTime<Utc>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub intentional_disconnect: bool,
}

impl Player {
    pub fn new(id: Uuid, name: impl Into<String>, wallet: i64) -> Self {
        Self {
            id,
            name: name.into(),
            state: PlayerState::Betting,
            bet: 0,
            wallet,
            hand: Hand::new(),
            connected_at: Utc::now(),
            disconnected_at: None,
            intentional_disconnect: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state != PlayerState::Inactive
    }

    pub fn validate_bet(&self, bet: i64) -> Result<(), GameError> {
        if bet < 1 {
            return Err(GameError::InvalidBet("bets must be at least 1".into()));
        }
        if bet > self.wallet {
            return Err(GameError::InvalidBet(
                "bet cannot exceed the current wallet".into(),
            ));
        }
        Ok(())
    }

    pub fn mark_disconnected(&mut self, intentional: bool) {
        self.disconnected_at = Some(Utc::now());
        self.intentional_disconnect = intentional;
    }

    pub fn mark_reconnected(&mut self) {
        self.disconnected_at = None;
        self.intentional_disconnect = false;
    }

    /// Intentional leavers go immediately; unintentional disconnects go
    /// once the grace window has elapsed.
    pub fn should_remove(&self, grace: Duration) -> bool {
        if self.intentional_disconnect {
            return true;
        }
        match self.disconnected_at {
            Some(at) => Utc::now() - at > grace,
            None => false,
        }
    }
}
