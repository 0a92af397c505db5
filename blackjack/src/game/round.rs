//! The single-round blackjack state machine.
//!
//! One `Game` owns the shoe, the seat array, and the dealer hand. All
//! transitions are one-way per round and guarded by `check_state`; callers
//! (the table actor) drive the machine and never observe partial states.

use super::card::Card;
use super::deck::Shoe;
use super::errors::GameError;
use super::hand::{Hand, HandState};
use super::player::{Player, PlayerState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub const DEFAULT_MAX_PLAYERS: usize = 5;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameState {
    WaitForStart,
    WaitingForBets,
    Dealing,
    PlayerTurn,
    DealerTurn,
    ResolvingBets,
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::WaitForStart => "WAIT_FOR_START",
            Self::WaitingForBets => "WAITING_FOR_BETS",
            Self::Dealing => "DEALING",
            Self::PlayerTurn => "PLAYER_TURN",
            Self::DealerTurn => "DEALER_TURN",
            Self::ResolvingBets => "RESOLVING_BETS",
        };
        write!(f, "{repr}")
    }
}

/// Per-round settings the table passes down from its config.
#[derive(Clone, Copy, Debug)]
pub struct GameRules {
    pub stand_on_soft_17: bool,
    pub deck_count: usize,
    pub cut_location: usize,
    pub max_players: usize,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            stand_on_soft_17: true,
            deck_count: super::deck::DEFAULT_DECK_COUNT,
            cut_location: super::deck::DEFAULT_CUT_LOCATION,
            max_players: DEFAULT_MAX_PLAYERS,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Won,
    Lost,
    Tied,
}

/// Per-player accounting returned by `resolve_bets`. The persistence
/// boundary consumes this map; the game never touches the store.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RoundResult {
    pub outcome: Outcome,
    pub blackjack: bool,
    pub bet: i64,
    /// Wallet after the payout was credited.
    pub wallet: i64,
    /// Net change for the round (payout minus stake).
    pub wallet_delta: i64,
}

/// One table's game instance. Single-threaded; driven by the table actor.
#[derive(Debug)]
pub struct Game {
    state: GameState,
    shoe: Shoe,
    seats: Vec<Option<Player>>,
    dealer_hand: Hand,
    /// Seat-ordered ids of the players dealt into the current round,
    /// snapshotted at DEALING.
    active: Vec<Uuid>,
    current: usize,
    stand_on_soft_17: bool,
}

impl Game {
    pub fn new(rules: GameRules) -> Self {
        let shoe = Shoe::new(rules.deck_count, rules.cut_location);
        Self::with_shoe(rules, shoe)
    }

    /// Run a game over a prepared shoe. Tests use this to script rounds.
    pub fn with_shoe(rules: GameRules, shoe: Shoe) -> Self {
        Self {
            state: GameState::WaitForStart,
            shoe,
            seats: (0..rules.max_players).map(|_| None).collect(),
            dealer_hand: Hand::new(),
            active: Vec::new(),
            current: 0,
            stand_on_soft_17: rules.stand_on_soft_17,
        }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn dealer_hand(&self) -> &Hand {
        &self.dealer_hand
    }

    /// Seated players in seat order.
    pub fn seated(&self) -> impl Iterator<Item = &Player> {
        self.seats.iter().flatten()
    }

    pub fn player(&self, id: Uuid) -> Option<&Player> {
        self.seats
            .iter()
            .flatten()
            .find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: Uuid) -> Option<&mut Player> {
        self.seats
            .iter_mut()
            .flatten()
            .find(|p| p.id == id)
    }

    pub fn current_player_id(&self) -> Option<Uuid> {
        if self.state != GameState::PlayerTurn {
            return None;
        }
        self.active.get(self.current).copied()
    }

    fn check_state(&self, expected: GameState, op: &'static str) -> Result<(), GameError> {
        if self.state != expected {
            return Err(GameError::InvalidState {
                op,
                state: self.state,
            });
        }
        Ok(())
    }

    /// WAIT_FOR_START -> WAITING_FOR_BETS. Valid once per idle table.
    pub fn start_game(&mut self) -> Result<(), GameError> {
        self.check_state(GameState::WaitForStart, "start_game")?;
        self.state = GameState::WaitingForBets;
        Ok(())
    }

    /// Seat a player at the first open seat.
    pub fn add_player(&mut self, player: Player) -> Result<(), GameError> {
        match self.seats.iter_mut().find(|s| s.is_none()) {
            Some(seat) => {
                *seat = Some(player);
                Ok(())
            }
            None => Err(GameError::TableFull),
        }
    }

    /// Clear a seat. No-op if the player is not seated. If the cursor was
    /// on the removed player mid-turn, play moves on.
    pub fn remove_player(&mut self, id: Uuid) {
        let was_current = self.current_player_id() == Some(id);
        for seat in &mut self.seats {
            if seat.as_ref().is_some_and(|p| p.id == id) {
                *seat = None;
            }
        }
        if was_current {
            self.sync_cursor();
        }
    }

    pub fn place_bet(&mut self, id: Uuid, bet: i64) -> Result<(), GameError> {
        self.check_state(GameState::WaitingForBets, "place_bet")?;
        let player = self.player_mut(id).ok_or(GameError::NotSeated)?;
        player.validate_bet(bet)?;
        player.bet = bet;
        player.wallet -= bet;
        player.state = PlayerState::BetsMade;
        Ok(())
    }

    /// True once every seated player has a bet down.
    pub fn all_players_bet(&self) -> bool {
        self.seated().all(|p| p.bet > 0)
    }

    /// WAITING_FOR_BETS -> DEALING. Needs at least one bet; seated players
    /// without one sit this round out.
    pub fn start_round(&mut self) -> Result<(), GameError> {
        self.check_state(GameState::WaitingForBets, "start_round")?;
        if !self.seated().any(|p| p.bet > 0) {
            return Err(GameError::NoActiveBets);
        }
        for player in self.seats.iter_mut().flatten() {
            if player.bet == 0 {
                player.state = PlayerState::Inactive;
            }
        }
        self.state = GameState::Dealing;
        Ok(())
    }

    /// DEALING -> PLAYER_TURN. Snapshots the active players, reshuffles a
    /// short shoe, and deals two rounds to each player then two cards to
    /// the dealer.
    pub fn deal_cards(&mut self) -> Result<(), GameError> {
        self.check_state(GameState::Dealing, "deal_cards")?;

        if self.shoe.needs_reshuffle() {
            self.shoe.shuffle();
        }

        self.dealer_hand = Hand::new();
        self.active = self
            .seats
            .iter()
            .flatten()
            .filter(|p| p.is_active())
            .map(|p| p.id)
            .collect();

        for id in self.active.clone() {
            if let Some(player) = self.player_mut(id) {
                player.hand = Hand::new();
                player.state = PlayerState::WaitingForAction;
            }
        }

        for _ in 0..2 {
            for id in self.active.clone() {
                let card = self.shoe.draw()?;
                if let Some(player) = self.player_mut(id) {
                    player.hand.add(card);
                }
            }
        }
        for _ in 0..2 {
            let card = self.shoe.draw()?;
            self.dealer_hand.add(card);
        }

        self.state = GameState::PlayerTurn;
        self.current = 0;
        self.sync_cursor();
        Ok(())
    }

    pub fn hit(&mut self, id: Uuid) -> Result<Card, GameError> {
        self.check_state(GameState::PlayerTurn, "hit")?;
        if self.current_player_id() != Some(id) {
            return Err(GameError::NotYourTurn);
        }
        let card = self.shoe.draw()?;
        let player = self.player_mut(id).ok_or(GameError::NotSeated)?;
        player.hand.add(card);
        if player.hand.state() == HandState::Bust {
            player.state = PlayerState::Done;
            self.advance();
        }
        Ok(card)
    }

    pub fn stay(&mut self, id: Uuid) -> Result<(), GameError> {
        self.check_state(GameState::PlayerTurn, "stay")?;
        if self.current_player_id() != Some(id) {
            return Err(GameError::NotYourTurn);
        }
        if let Some(player) = self.player_mut(id) {
            player.state = PlayerState::Done;
        }
        self.advance();
        Ok(())
    }

    fn advance(&mut self) {
        self.current += 1;
        self.sync_cursor();
    }

    /// Move the cursor to the next seat still owed a turn; when none
    /// remain, the dealer plays.
    fn sync_cursor(&mut self) {
        if self.state != GameState::PlayerTurn {
            return;
        }
        while self.current < self.active.len() {
            let id = self.active[self.current];
            match self.player_mut(id) {
                Some(player)
                    if matches!(
                        player.state,
                        PlayerState::WaitingForAction | PlayerState::PlayingTurn
                    ) =>
                {
                    player.state = PlayerState::PlayingTurn;
                    return;
                }
                _ => self.current += 1,
            }
        }
        self.state = GameState::DealerTurn;
    }

    /// DEALER_TURN -> RESOLVING_BETS. Dealer draws to 17, hitting soft 17
    /// when the house rule says so.
    pub fn play_dealer(&mut self) -> Result<(), GameError> {
        self.check_state(GameState::DealerTurn, "play_dealer")?;
        loop {
            while self.dealer_hand.value() < 17 {
                let card = self.shoe.draw()?;
                self.dealer_hand.add(card);
            }
            if self.dealer_hand.value() == 17
                && self.dealer_hand.is_soft()
                && !self.stand_on_soft_17
            {
                let card = self.shoe.draw()?;
                self.dealer_hand.add(card);
                continue;
            }
            break;
        }
        self.state = GameState::ResolvingBets;
        Ok(())
    }

    /// RESOLVING_BETS -> WAITING_FOR_BETS. Credits every active player's
    /// payout and reports the round per player id.
    pub fn resolve_bets(&mut self) -> Result<HashMap<Uuid, RoundResult>, GameError> {
        self.check_state(GameState::ResolvingBets, "resolve_bets")?;

        let mut results = HashMap::with_capacity(self.active.len());
        for id in self.active.clone() {
            let dealer_state = self.dealer_hand.state();
            let dealer_value = self.dealer_hand.value();
            if let Some(player) = self.player_mut(id) {
                // A seat vacated and re-filled mid-round carries the old
                // id but was never dealt in; it has nothing to settle.
                if player.hand.is_empty() {
                    continue;
                }
                let (payout, outcome) =
                    payout_for(player, dealer_state, dealer_value);
                player.wallet += payout;
                results.insert(
                    id,
                    RoundResult {
                        outcome,
                        blackjack: player.hand.state() == HandState::Blackjack,
                        bet: player.bet,
                        wallet: player.wallet,
                        wallet_delta: payout - player.bet,
                    },
                );
            }
        }

        self.reset();
        self.state = GameState::WaitingForBets;
        Ok(results)
    }

    fn reset(&mut self) {
        for player in self.seats.iter_mut().flatten() {
            player.bet = 0;
            player.hand.clear();
            player.state = PlayerState::Betting;
        }
        self.dealer_hand = Hand::new();
        self.active.clear();
        self.current = 0;
    }
}

/// The payout table. Returns the amount credited back to the wallet and
/// the reported outcome; a push returns the original stake.
fn payout_for(player: &Player, dealer_state: HandState, dealer_value: u32) -> (i64, Outcome) {
    let state = player.hand.state();
    let value = player.hand.value();
    let bet = player.bet;
    let blackjack_payout = bet + bet * 3 / 2;

    if state == HandState::Bust {
        return (0, Outcome::Lost);
    }
    if state == HandState::Blackjack {
        if dealer_state == HandState::Blackjack {
            return (bet, Outcome::Tied);
        }
        return (blackjack_payout, Outcome::Won);
    }
    if dealer_state == HandState::Bust {
        return (bet * 2, Outcome::Won);
    }
    if value == dealer_value && dealer_state != HandState::Blackjack {
        return (bet, Outcome::Tied);
    }
    if value > dealer_value {
        return (bet * 2, Outcome::Won);
    }
    (0, Outcome::Lost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::card::{Suit, ACE, KING};

    fn card(rank: u8) -> Card {
        Card::new(Suit::Spade, rank)
    }

    fn rigged_game(top: &[u8], stand_on_soft_17: bool) -> Game {
        let rules = GameRules {
            stand_on_soft_17,
            ..GameRules::default()
        };
        let shoe = Shoe::from_top(top.iter().map(|&r| card(r)).collect(), 0);
        Game::with_shoe(rules, shoe)
    }

    fn seat(game: &mut Game, wallet: i64) -> Uuid {
        let id = Uuid::new_v4();
        game.add_player(Player::new(id, format!("p-{id}"), wallet))
            .unwrap();
        id
    }

    #[test]
    fn seats_fill_in_order_until_full() {
        let mut game = Game::new(GameRules::default());
        for _ in 0..DEFAULT_MAX_PLAYERS {
            seat(&mut game, 100);
        }
        let extra = Player::new(Uuid::new_v4(), "late", 100);
        assert_eq!(game.add_player(extra), Err(GameError::TableFull));
    }

    #[test]
    fn start_game_is_one_shot() {
        let mut game = Game::new(GameRules::default());
        game.start_game().unwrap();
        assert!(matches!(
            game.start_game(),
            Err(GameError::InvalidState { op: "start_game", .. })
        ));
    }

    #[test]
    fn place_bet_deducts_wallet() {
        let mut game = Game::new(GameRules::default());
        let id = seat(&mut game, 100);
        game.start_game().unwrap();
        game.place_bet(id, 30).unwrap();
        let p = game.player(id).unwrap();
        assert_eq!(p.bet, 30);
        assert_eq!(p.wallet, 70);
        assert_eq!(p.state, PlayerState::BetsMade);
    }

    #[test]
    fn bet_rejected_outside_betting_phase() {
        let mut game = Game::new(GameRules::default());
        let id = seat(&mut game, 100);
        assert!(matches!(
            game.place_bet(id, 10),
            Err(GameError::InvalidState { .. })
        ));
    }

    #[test]
    fn bet_rejected_for_unseated_player() {
        let mut game = Game::new(GameRules::default());
        seat(&mut game, 100);
        game.start_game().unwrap();
        assert_eq!(
            game.place_bet(Uuid::new_v4(), 10),
            Err(GameError::NotSeated)
        );
    }

    #[test]
    fn start_round_requires_a_bet() {
        let mut game = Game::new(GameRules::default());
        seat(&mut game, 100);
        game.start_game().unwrap();
        assert_eq!(game.start_round(), Err(GameError::NoActiveBets));
        assert_eq!(game.state(), GameState::WaitingForBets);
    }

    #[test]
    fn non_bettors_sit_the_round() {
        let mut game = rigged_game(&[10, 9, 10, 9, 10, 7], true);
        let bettor = seat(&mut game, 100);
        let idler = seat(&mut game, 100);
        game.start_game().unwrap();
        game.place_bet(bettor, 10).unwrap();
        game.start_round().unwrap();
        assert_eq!(game.player(idler).unwrap().state, PlayerState::Inactive);

        game.deal_cards().unwrap();
        assert!(game.player(idler).unwrap().hand.is_empty());
        assert_eq!(game.player(bettor).unwrap().hand.len(), 2);
        assert_eq!(game.current_player_id(), Some(bettor));

        game.stay(bettor).unwrap();
        game.play_dealer().unwrap();
        let results = game.resolve_bets().unwrap();
        assert!(results.contains_key(&bettor));
        assert!(!results.contains_key(&idler));
        // Everyone is back in the betting pool for the next round.
        assert_eq!(game.player(idler).unwrap().state, PlayerState::Betting);
        assert_eq!(game.player(bettor).unwrap().state, PlayerState::Betting);
    }

    #[test]
    fn blackjack_against_dealer_blackjack_pushes() {
        // Player: A K. Dealer: A K.
        let mut game = rigged_game(&[ACE, KING, ACE, KING], true);
        let id = seat(&mut game, 100);
        game.start_game().unwrap();
        game.place_bet(id, 10).unwrap();
        game.start_round().unwrap();
        game.deal_cards().unwrap();
        // A two-card 21 ends the hand without input; the cursor skips a
        // blackjack player only after they act, so stand through it.
        game.stay(id).unwrap();
        game.play_dealer().unwrap();
        let results = game.resolve_bets().unwrap();

        let result = &results[&id];
        assert_eq!(result.outcome, Outcome::Tied);
        assert!(result.blackjack);
        assert_eq!(result.bet, 10);
        assert_eq!(result.wallet, 100);
        assert_eq!(result.wallet_delta, 0);
    }

    #[test]
    fn blackjack_beats_dealer_twenty() {
        // Player: A K (21). Dealer: K Q (20).
        let mut game = rigged_game(&[ACE, KING, KING, 12], true);
        let id = seat(&mut game, 100);
        game.start_game().unwrap();
        game.place_bet(id, 10).unwrap();
        game.start_round().unwrap();
        game.deal_cards().unwrap();
        game.stay(id).unwrap();
        game.play_dealer().unwrap();
        let results = game.resolve_bets().unwrap();

        let result = &results[&id];
        assert_eq!(result.outcome, Outcome::Won);
        assert!(result.blackjack);
        // 3:2 on a 10 bet: stake back plus 15.
        assert_eq!(result.wallet, 115);
        assert_eq!(result.wallet_delta, 15);
    }

    #[test]
    fn dealer_blackjack_beats_three_card_twentyone() {
        // Player: 7 7 then hits a 7 (21 in three). Dealer: A K.
        let mut game = rigged_game(&[7, 7, ACE, KING, 7], true);
        let id = seat(&mut game, 100);
        game.start_game().unwrap();
        game.place_bet(id, 10).unwrap();
        game.start_round().unwrap();
        game.deal_cards().unwrap();
        game.hit(id).unwrap();
        game.stay(id).unwrap();
        game.play_dealer().unwrap();
        let results = game.resolve_bets().unwrap();

        let result = &results[&id];
        assert_eq!(result.outcome, Outcome::Lost);
        assert!(!result.blackjack);
        assert_eq!(result.wallet, 90);
        assert_eq!(result.wallet_delta, -10);
    }

    #[test]
    fn equal_values_push_the_stake_back() {
        // Player: K Q (20). Dealer: K Q (20).
        let mut game = rigged_game(&[KING, 12, KING, 12], true);
        let id = seat(&mut game, 100);
        game.start_game().unwrap();
        game.place_bet(id, 25).unwrap();
        game.start_round().unwrap();
        game.deal_cards().unwrap();
        game.stay(id).unwrap();
        game.play_dealer().unwrap();
        let results = game.resolve_bets().unwrap();

        let result = &results[&id];
        assert_eq!(result.outcome, Outcome::Tied);
        assert_eq!(result.wallet, 100);
    }

    #[test]
    fn dealer_bust_pays_live_hands() {
        // Player: K 8 (18). Dealer: K 6 then draws K -> 26 bust.
        let mut game = rigged_game(&[KING, 8, KING, 6, KING], true);
        let id = seat(&mut game, 100);
        game.start_game().unwrap();
        game.place_bet(id, 10).unwrap();
        game.start_round().unwrap();
        game.deal_cards().unwrap();
        game.stay(id).unwrap();
        game.play_dealer().unwrap();
        assert_eq!(game.dealer_hand().state(), HandState::Bust);
        let results = game.resolve_bets().unwrap();

        let result = &results[&id];
        assert_eq!(result.outcome, Outcome::Won);
        assert_eq!(result.wallet, 110);
        assert_eq!(result.wallet_delta, 10);
    }

    #[test]
    fn player_bust_ends_the_turn() {
        // Player: 10 10, hits a 10. Dealer: 10 10.
        let mut game = rigged_game(&[10, 10, 10, 10, 10], true);
        let id = seat(&mut game, 100);
        game.start_game().unwrap();
        game.place_bet(id, 10).unwrap();
        game.start_round().unwrap();
        game.deal_cards().unwrap();
        game.hit(id).unwrap();
        assert_eq!(game.player(id).unwrap().state, PlayerState::Done);
        assert_eq!(game.state(), GameState::DealerTurn);

        game.play_dealer().unwrap();
        let results = game.resolve_bets().unwrap();
        let result = &results[&id];
        assert_eq!(result.outcome, Outcome::Lost);
        assert_eq!(result.wallet, 90);
    }

    #[test]
    fn dealer_hits_soft_17_when_configured() {
        // Player: 10 10. Dealer: A 6 (soft 17) then draws a 10.
        let mut game = rigged_game(&[10, 10, ACE, 6, 10], false);
        let id = seat(&mut game, 100);
        game.start_game().unwrap();
        game.place_bet(id, 10).unwrap();
        game.start_round().unwrap();
        game.deal_cards().unwrap();
        game.stay(id).unwrap();
        game.play_dealer().unwrap();
        assert_eq!(game.dealer_hand().len(), 3);
        assert_eq!(game.dealer_hand().value(), 17);
        assert!(!game.dealer_hand().is_soft());
    }

    #[test]
    fn dealer_stands_on_soft_17_by_default() {
        let mut game = rigged_game(&[10, 10, ACE, 6, 10], true);
        let id = seat(&mut game, 100);
        game.start_game().unwrap();
        game.place_bet(id, 10).unwrap();
        game.start_round().unwrap();
        game.deal_cards().unwrap();
        game.stay(id).unwrap();
        game.play_dealer().unwrap();
        assert_eq!(game.dealer_hand().len(), 2);
        assert!(game.dealer_hand().is_soft());
    }

    #[test]
    fn turns_move_through_seats_in_order() {
        let mut game = rigged_game(&[5, 6, 5, 6, 5, 6, 10, 9], true);
        let first = seat(&mut game, 100);
        let second = seat(&mut game, 100);
        let third = seat(&mut game, 100);
        game.start_game().unwrap();
        for id in [first, second, third] {
            game.place_bet(id, 10).unwrap();
        }
        game.start_round().unwrap();
        game.deal_cards().unwrap();

        assert_eq!(game.current_player_id(), Some(first));
        assert_eq!(game.hit(second), Err(GameError::NotYourTurn));
        game.stay(first).unwrap();
        assert_eq!(game.current_player_id(), Some(second));
        game.stay(second).unwrap();
        assert_eq!(game.current_player_id(), Some(third));
        game.stay(third).unwrap();
        assert_eq!(game.state(), GameState::DealerTurn);
    }

    #[test]
    fn removing_the_current_player_advances_play() {
        let mut game = rigged_game(&[5, 6, 5, 6, 10, 9], true);
        let first = seat(&mut game, 100);
        let second = seat(&mut game, 100);
        game.start_game().unwrap();
        game.place_bet(first, 10).unwrap();
        game.place_bet(second, 10).unwrap();
        game.start_round().unwrap();
        game.deal_cards().unwrap();

        game.remove_player(first);
        assert_eq!(game.current_player_id(), Some(second));
        game.stay(second).unwrap();
        assert_eq!(game.state(), GameState::DealerTurn);
    }

    #[test]
    fn resolve_clears_hands_and_bets() {
        let mut game = rigged_game(&[10, 9, 10, 9, 5], true);
        let id = seat(&mut game, 100);
        game.start_game().unwrap();
        game.place_bet(id, 10).unwrap();
        game.start_round().unwrap();
        game.deal_cards().unwrap();
        game.stay(id).unwrap();
        game.play_dealer().unwrap();
        game.resolve_bets().unwrap();

        assert_eq!(game.state(), GameState::WaitingForBets);
        let p = game.player(id).unwrap();
        assert!(p.hand.is_empty());
        assert_eq!(p.bet, 0);
        assert!(game.dealer_hand().is_empty());
    }

    #[test]
    fn consecutive_rounds_share_the_shoe() {
        // Round 1: player 10 9 vs dealer 10 8 (win). Round 2: player K Q
        // vs dealer K 9 (win again). One shoe, no reshuffle.
        let mut game = rigged_game(&[10, 9, 10, 8, KING, 12, KING, 9], true);
        let id = seat(&mut game, 100);
        game.start_game().unwrap();

        for expected_wallet in [110, 120] {
            game.place_bet(id, 10).unwrap();
            game.start_round().unwrap();
            game.deal_cards().unwrap();
            game.stay(id).unwrap();
            game.play_dealer().unwrap();
            let results = game.resolve_bets().unwrap();
            assert_eq!(results[&id].outcome, Outcome::Won);
            assert_eq!(game.player(id).unwrap().wallet, expected_wallet);
            assert_eq!(game.state(), GameState::WaitingForBets);
        }
    }

    #[test]
    fn cursor_always_points_at_an_actionable_seat() {
        let mut game = rigged_game(&[5, 6, 5, 6, 10, 9, 2, 2], true);
        let first = seat(&mut game, 100);
        let second = seat(&mut game, 100);
        game.start_game().unwrap();
        game.place_bet(first, 10).unwrap();
        game.place_bet(second, 10).unwrap();
        game.start_round().unwrap();
        game.deal_cards().unwrap();

        while game.state() == GameState::PlayerTurn {
            let id = game.current_player_id().expect("cursor valid in PLAYER_TURN");
            let player = game.player(id).expect("cursor names a seated player");
            assert_eq!(player.state, PlayerState::PlayingTurn);
            game.stay(id).unwrap();
        }
        assert_eq!(game.state(), GameState::DealerTurn);
    }

    #[test]
    fn get_state_style_reads_do_not_mutate() {
        let mut game = rigged_game(&[10, 9, 10, 9], true);
        let id = seat(&mut game, 100);
        game.start_game().unwrap();
        game.place_bet(id, 10).unwrap();
        let before = game.state();
        let _ = game.player(id);
        let _ = game.dealer_hand();
        let _ = game.current_player_id();
        assert_eq!(game.state(), before);
    }
}
