//! Data-transfer shapes for the wire.

use crate::game::{Card, Game, GameState, Hand, HandState};
use crate::store::UserRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HandDto {
    pub cards: Vec<Card>,
    pub value: i32,
    pub state: HandState,
}

impl HandDto {
    /// The full hand as the owner (or everyone, late in a round) sees it.
    pub fn full(hand: &Hand) -> Self {
        Self {
            cards: hand.cards().to_vec(),
            value: hand.value() as i32,
            state: hand.state(),
        }
    }

    /// The dealer's hand while the hole card is still secret: upcard only,
    /// value reported as -1, state computed from the upcard alone.
    pub fn hidden(hand: &Hand) -> Self {
        let upcard: Vec<Card> = hand.cards().iter().take(1).copied().collect();
        let visible: Hand = upcard.iter().copied().collect();
        Self {
            cards: upcard,
            value: -1,
            state: visible.state(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PlayerDto {
    pub bet: i64,
    pub wallet: i64,
    pub hand: HandDto,
    pub name: String,
    pub current: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GameDto {
    #[serde(rename = "Players")]
    pub players: Vec<PlayerDto>,
    #[serde(rename = "DealerHand")]
    pub dealer_hand: HandDto,
}

impl GameDto {
    pub fn from_game(game: &Game) -> Self {
        let current = game.current_player_id();
        let players = game
            .seated()
            .map(|p| PlayerDto {
                bet: p.bet,
                wallet: p.wallet,
                hand: HandDto::full(&p.hand),
                name: p.name.clone(),
                current: current == Some(p.id),
            })
            .collect();

        // The hole card only becomes public once the dealer is playing.
        let dealer_hand = match game.state() {
            GameState::DealerTurn | GameState::ResolvingBets | GameState::WaitingForBets => {
                HandDto::full(game.dealer_hand())
            }
            _ => HandDto::hidden(game.dealer_hand()),
        };

        Self {
            players,
            dealer_hand,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TableDto {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Capacity")]
    pub capacity: usize,
    #[serde(rename = "CurrentPlayers")]
    pub current_players: usize,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PopUpLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for PopUpLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PopUpDto {
    pub message: String,
    #[serde(rename = "type")]
    pub level: PopUpLevel,
}

impl PopUpDto {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: PopUpLevel::Info,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: PopUpLevel::Warn,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: PopUpLevel::Error,
        }
    }
}

/// Lifetime counters plus the derived win percentage.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct UserStatsDto {
    pub name: String,
    pub wallet: i64,
    pub total_bet: i64,
    pub total_won: i64,
    pub total_lost: i64,
    pub hands_played: i64,
    pub hands_won: i64,
    pub hands_lost: i64,
    pub blackjacks: i64,
    pub login_streak: i64,
    pub win_percentage: f64,
}

impl From<&UserRecord> for UserStatsDto {
    fn from(user: &UserRecord) -> Self {
        let win_percentage = if user.hands_played > 0 {
            user.hands_won as f64 / user.hands_played as f64 * 100.0
        } else {
            0.0
        };
        Self {
            name: user.provider_id.clone(),
            wallet: user.wallet,
            total_bet: user.total_bet,
            total_won: user.total_won,
            total_lost: user.total_lost,
            hands_played: user.hands_played,
            hands_won: user.hands_won,
            hands_lost: user.hands_lost,
            blackjacks: user.blackjacks,
            login_streak: user.login_streak,
            win_percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GameRules, Player, Shoe, Suit, ACE, KING};
    use uuid::Uuid;

    fn card(rank: u8) -> Card {
        Card::new(Suit::Heart, rank)
    }

    fn dealt_game(top: &[u8]) -> (Game, Uuid) {
        let shoe = Shoe::from_top(top.iter().map(|&r| card(r)).collect(), 0);
        let mut game = Game::with_shoe(GameRules::default(), shoe);
        let id = Uuid::new_v4();
        game.add_player(Player::new(id, "dealer-test", 100)).unwrap();
        game.start_game().unwrap();
        game.place_bet(id, 10).unwrap();
        game.start_round().unwrap();
        game.deal_cards().unwrap();
        (game, id)
    }

    #[test]
    fn dealer_hand_is_hidden_during_player_turn() {
        let (game, _) = dealt_game(&[10, 9, KING, 7]);
        let dto = GameDto::from_game(&game);
        assert_eq!(dto.dealer_hand.cards.len(), 1);
        assert_eq!(dto.dealer_hand.cards[0].rank, KING);
        assert_eq!(dto.dealer_hand.value, -1);
    }

    #[test]
    fn dealer_hand_is_revealed_after_player_turn() {
        let (mut game, id) = dealt_game(&[10, 9, KING, 7]);
        game.stay(id).unwrap();
        let dto = GameDto::from_game(&game);
        assert_eq!(dto.dealer_hand.cards.len(), 2);
        assert_eq!(dto.dealer_hand.value, 17);
    }

    #[test]
    fn dealer_hand_is_visible_between_rounds() {
        let (mut game, id) = dealt_game(&[10, 9, KING, 7, 5]);
        game.stay(id).unwrap();
        game.play_dealer().unwrap();
        game.resolve_bets().unwrap();
        // WAITING_FOR_BETS shows the (now empty) dealer hand plainly.
        let dto = GameDto::from_game(&game);
        assert_eq!(dto.dealer_hand.value, 0);
        assert!(dto.dealer_hand.cards.is_empty());
    }

    #[test]
    fn current_flag_follows_the_cursor() {
        let (game, _) = dealt_game(&[10, 9, KING, 7]);
        let dto = GameDto::from_game(&game);
        assert_eq!(dto.players.len(), 1);
        assert!(dto.players[0].current);
        assert_eq!(dto.players[0].bet, 10);
        assert_eq!(dto.players[0].wallet, 90);
        assert_eq!(dto.players[0].name, "dealer-test");
    }

    #[test]
    fn blackjack_upcard_does_not_leak_the_hole_card() {
        // Dealer holds A + K; the hidden view must not classify it.
        let (game, _) = dealt_game(&[10, 9, ACE, KING]);
        let dto = GameDto::from_game(&game);
        assert_eq!(dto.dealer_hand.cards.len(), 1);
        assert_eq!(dto.dealer_hand.value, -1);
        assert_eq!(dto.dealer_hand.state, HandState::Live);
    }

    #[test]
    fn stats_dto_computes_win_percentage() {
        let user = UserRecord {
            provider_id: "octocat".into(),
            wallet: 250,
            total_bet: 100,
            total_won: 60,
            total_lost: 40,
            hands_played: 8,
            hands_won: 2,
            hands_lost: 6,
            blackjacks: 1,
            login_streak: 3,
            last_login: None,
            starred: false,
        };
        let dto = UserStatsDto::from(&user);
        assert_eq!(dto.win_percentage, 25.0);
        assert_eq!(dto.hands_played, 8);
    }

    #[test]
    fn stats_dto_handles_zero_hands() {
        let user = UserRecord {
            provider_id: "newbie".into(),
            wallet: 100,
            total_bet: 0,
            total_won: 0,
            total_lost: 0,
            hands_played: 0,
            hands_won: 0,
            hands_lost: 0,
            blackjacks: 0,
            login_streak: 0,
            last_login: None,
            starred: false,
        };
        assert_eq!(UserStatsDto::from(&user).win_percentage, 0.0);
    }
}
