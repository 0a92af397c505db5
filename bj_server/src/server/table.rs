//! The table actor: one game, its timers, its clients.
//!
//! All mutation of the game and the client set happens inside `run`; the
//! outside world only sends on the mailbox. Broadcasts never block — a
//! client that cannot keep up is evicted.

use super::client::{Client, InboundMessage, Manager};
use super::lobby::LobbyHandle;
use super::timer::ResettableTimer;
use crate::config::Config;
use async_trait::async_trait;
use blackjack::game::{Game, GameError, GameState, Player, DISCONNECT_GRACE};
use blackjack::protocol::{ClientCommand, GameDto, PopUpDto, ServerMessage};
use blackjack::store::Store;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const MAILBOX_BUFFER: usize = 64;
const CLEANUP_PERIOD: Duration = Duration::from_secs(5);

/// Timer durations, lifted from the server config.
#[derive(Clone, Copy, Debug)]
pub struct TableTimings {
    pub bet_time: Duration,
    pub action_timeout: Duration,
    pub idle_delete: Duration,
    /// How long a disconnected player keeps their seat.
    pub grace: chrono::Duration,
}

impl TableTimings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bet_time: Duration::from_secs(config.bet_time_seconds),
            action_timeout: Duration::from_secs(config.table_action_timeout_seconds),
            idle_delete: Duration::from_secs(config.table_auto_delete_timeout_minutes * 60),
            grace: DISCONNECT_GRACE,
        }
    }
}

pub enum TableMessage {
    Register(Arc<Client>),
    Unregister(Arc<Client>),
    Inbound(InboundMessage),
}

/// Cheap clone used by the lobby and by connection actors. The occupancy
/// counter is maintained by the table actor so the lobby can build its
/// table list without touching table state.
#[derive(Clone)]
pub struct TableHandle {
    name: Arc<str>,
    tx: mpsc::Sender<TableMessage>,
    cancel: CancellationToken,
    occupancy: Arc<AtomicUsize>,
    capacity: usize,
}

impl TableHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn occupancy(&self) -> usize {
        self.occupancy.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[async_trait]
impl Manager for TableHandle {
    fn id(&self) -> &str {
        &self.name
    }

    async fn register(&self, client: Arc<Client>) {
        if self.tx.send(TableMessage::Register(client)).await.is_err() {
            log::warn!("table {}: register on closed mailbox", self.name);
        }
    }

    async fn unregister(&self, client: Arc<Client>) {
        if self
            .tx
            .send(TableMessage::Unregister(client))
            .await
            .is_err()
        {
            log::debug!("table {}: unregister on closed mailbox", self.name);
        }
    }

    fn send_message(&self, msg: InboundMessage) -> Result<(), InboundMessage> {
        self.tx
            .try_send(TableMessage::Inbound(msg))
            .map_err(|err| match err.into_inner() {
                TableMessage::Inbound(msg) => msg,
                _ => unreachable!("only inbound messages are sent through send_message"),
            })
    }
}

enum ExitReason {
    Cancelled,
    Idle,
}

pub struct TableActor {
    name: Arc<str>,
    game: Game,
    clients: HashMap<Uuid, Arc<Client>>,
    inbox: mpsc::Receiver<TableMessage>,
    lobby: LobbyHandle,
    store: Store,
    timings: TableTimings,
    bet_timer: ResettableTimer,
    action_timer: ResettableTimer,
    idle_timer: ResettableTimer,
    cancel: CancellationToken,
    occupancy: Arc<AtomicUsize>,
}

impl TableActor {
    /// Build the actor and spawn its loop under the given cancel token.
    pub fn spawn(
        name: String,
        game: Game,
        max_players: usize,
        lobby: LobbyHandle,
        store: Store,
        timings: TableTimings,
        cancel: CancellationToken,
    ) -> (TableHandle, JoinHandle<()>) {
        let (tx, inbox) = mpsc::channel(MAILBOX_BUFFER);
        let name: Arc<str> = name.into();
        let occupancy = Arc::new(AtomicUsize::new(0));

        let handle = TableHandle {
            name: name.clone(),
            tx,
            cancel: cancel.clone(),
            occupancy: occupancy.clone(),
            capacity: max_players,
        };

        let actor = Self {
            name,
            game,
            clients: HashMap::new(),
            inbox,
            lobby,
            store,
            timings,
            bet_timer: ResettableTimer::new(),
            action_timer: ResettableTimer::new(),
            idle_timer: ResettableTimer::new(),
            cancel,
            occupancy,
        };

        let task = tokio::spawn(actor.run());
        (handle, task)
    }

    async fn run(mut self) {
        log::info!("table {}: starting", self.name);
        crate::metrics::active_tables(1);
        self.idle_timer.arm(self.timings.idle_delete);
        let mut cleanup = tokio::time::interval(CLEANUP_PERIOD);
        cleanup.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break ExitReason::Cancelled,
                message = self.inbox.recv() => {
                    let Some(message) = message else { break ExitReason::Cancelled };
                    self.idle_timer.arm(self.timings.idle_delete);
                    match message {
                        TableMessage::Register(client) => {
                            self.register_client(client).await;
                            self.auto_progress().await;
                        }
                        TableMessage::Unregister(client) => self.unregister_client(&client),
                        TableMessage::Inbound(msg) => {
                            self.handle_command(msg).await;
                            self.auto_progress().await;
                        }
                    }
                }
                _ = self.bet_timer.fired() => {
                    log::info!("table {}: bet timer expired, forcing the round", self.name);
                    match self.game.start_round() {
                        Ok(()) => self.auto_progress().await,
                        Err(GameError::NoActiveBets) => {
                            // Nobody bet; wait out another betting window.
                            self.bet_timer.arm(self.timings.bet_time);
                        }
                        Err(err) => log::warn!("table {}: bet timer: {err}", self.name),
                    }
                }
                _ = self.action_timer.fired() => {
                    if self.game.state() != GameState::PlayerTurn {
                        continue;
                    }
                    if let Some(id) = self.game.current_player_id() {
                        log::info!("table {}: action timer expired, standing {id}", self.name);
                        if let Err(err) = self.game.stay(id) {
                            log::error!("table {}: timed-out stand failed: {err}", self.name);
                        }
                    }
                    self.action_timer.arm(self.timings.action_timeout);
                    self.auto_progress().await;
                }
                _ = self.idle_timer.fired() => {
                    log::info!("table {}: idle for too long, deleting", self.name);
                    break ExitReason::Idle;
                }
                _ = cleanup.tick() => self.remove_inactive_players(),
            }
        };

        match reason {
            ExitReason::Idle => {
                // Anyone still attached goes back to the lobby, then the
                // lobby drops us from its map.
                for (_, client) in self.clients.drain() {
                    let _ = client.try_queue(ServerMessage::PopUp(PopUpDto::info(
                        "Table closed, returning to lobby",
                    )));
                    client.set_manager(Arc::new(self.lobby.clone())).await;
                    self.lobby.register(client).await;
                }
                self.lobby.notify_delete(self.name.to_string()).await;
            }
            ExitReason::Cancelled => {
                log::info!("table {}: cancelled", self.name);
                for (_, client) in self.clients.drain() {
                    client.close();
                }
            }
        }
        self.occupancy.store(0, Ordering::Relaxed);
        crate::metrics::active_tables(-1);
        log::info!("table {}: closed", self.name);
    }

    /// Attach a client. A player reconnecting inside the grace window keeps
    /// their seat and wallet; anyone else is seated fresh with a wallet
    /// from the store. The first registration starts the betting phase.
    async fn register_client(&mut self, client: Arc<Client>) {
        let id = client.id();
        log::info!("table {}: registering client {id}", self.name);

        if let Some(player) = self.game.player_mut(id) {
            log::info!("table {}: {} reconnected", self.name, client.username());
            player.mark_reconnected();
        } else {
            let wallet = match self.store.get_or_create_user(client.username()).await {
                Ok(user) => user.wallet,
                Err(err) => {
                    log::error!(
                        "table {}: store lookup failed for {}: {err}",
                        self.name,
                        client.username()
                    );
                    blackjack::store::DEFAULT_WALLET
                }
            };
            let player = Player::new(id, client.username(), wallet);
            if self.game.add_player(player).is_err() {
                log::warn!("table {}: full, bouncing {id} back to the lobby", self.name);
                let _ = client.try_queue(ServerMessage::PopUp(PopUpDto::warn("Table is full")));
                client.set_manager(Arc::new(self.lobby.clone())).await;
                self.lobby.register(client).await;
                return;
            }
        }

        self.clients.insert(id, client);
        self.publish_occupancy();

        if self.game.state() == GameState::WaitForStart {
            let _ = self.game.start_game();
            self.bet_timer.arm(self.timings.bet_time);
        }
    }

    /// Unregister coming from the read pump is always an unintentional
    /// disconnect: the seat stays through the grace window.
    fn unregister_client(&mut self, client: &Arc<Client>) {
        let id = client.id();
        // A reconnect replaces the map entry; only the current socket may
        // detach the player.
        let is_current = self
            .clients
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, client));
        if !is_current {
            return;
        }
        log::info!("table {}: client {id} disconnected", self.name);
        if let Some(player) = self.game.player_mut(id) {
            player.mark_disconnected(false);
        }
        self.clients.remove(&id);
        self.publish_occupancy();
    }

    async fn handle_command(&mut self, msg: InboundMessage) {
        let client = msg.client;
        let id = client.id();
        log::debug!("table {}: {id} sent {:?}", self.name, msg.command.tag());

        match msg.command {
            ClientCommand::StartGame => match self.game.start_game() {
                Ok(()) => {
                    log::info!("table {}: game started", self.name);
                    self.bet_timer.arm(self.timings.bet_time);
                }
                Err(_) => {
                    self.warn(&client, "The game has already been started");
                }
            },
            ClientCommand::GetState => {
                let dto = GameDto::from_game(&self.game);
                let _ = client.try_queue(ServerMessage::GameState(dto));
            }
            ClientCommand::PlaceBet { value } => {
                let bet = match value.trim().parse::<i64>() {
                    Ok(bet) => bet,
                    Err(_) => {
                        self.warn(&client, "Bets must be a whole number");
                        return;
                    }
                };
                if let Err(err) = self.game.place_bet(id, bet) {
                    log::debug!("table {}: bet rejected for {id}: {err}", self.name);
                    self.warn(&client, "Cannot place bet right now");
                }
            }
            ClientCommand::Hit => match self.game.hit(id) {
                Ok(_) => self.action_timer.arm(self.timings.action_timeout),
                Err(err) => {
                    log::debug!("table {}: hit rejected for {id}: {err}", self.name);
                    self.warn(&client, "It is not your turn");
                }
            },
            ClientCommand::Stand => match self.game.stay(id) {
                Ok(()) => self.action_timer.arm(self.timings.action_timeout),
                Err(err) => {
                    log::debug!("table {}: stand rejected for {id}: {err}", self.name);
                    self.warn(&client, "It is not your turn");
                }
            },
            ClientCommand::DealCards => {
                if let Err(err) = self.game.deal_cards() {
                    log::debug!("table {}: deal rejected: {err}", self.name);
                    self.warn(&client, "Cards cannot be dealt right now");
                }
            }
            ClientCommand::LeaveTable => self.leave_table(client).await,
            ClientCommand::GetStats => {
                super::send_user_stats(&self.store, &client).await;
            }
            ClientCommand::JoinTable { .. }
            | ClientCommand::CreateTable { .. }
            | ClientCommand::DeleteTable { .. }
            | ClientCommand::TableList => {
                self.warn(&client, "That command is only available in the lobby");
            }
        }
    }

    /// Intentional departure: free the seat now and hand the connection
    /// back to the lobby. The manager swap is atomic with the client's next
    /// inbound dispatch.
    async fn leave_table(&mut self, client: Arc<Client>) {
        let id = client.id();
        log::info!("table {}: {id} leaving", self.name);
        if let Some(player) = self.game.player_mut(id) {
            player.mark_disconnected(true);
        }
        self.game.remove_player(id);
        self.clients.remove(&id);
        self.publish_occupancy();
        client.set_manager(Arc::new(self.lobby.clone())).await;
        self.lobby.register(client).await;
    }

    /// Drive the game through its internal states until it needs outside
    /// input again, broadcasting the full DTO after every transition.
    async fn auto_progress(&mut self) {
        loop {
            match self.game.state() {
                GameState::WaitingForBets => {
                    let has_players = self.game.seated().next().is_some();
                    if has_players && self.game.all_players_bet() {
                        if let Err(err) = self.game.start_round() {
                            log::warn!("table {}: cannot start round: {err}", self.name);
                            return;
                        }
                        self.bet_timer.disarm();
                    } else {
                        self.prompt_for_bets();
                        self.broadcast_game_state();
                        return;
                    }
                }
                GameState::Dealing => {
                    if let Err(err) = self.game.deal_cards() {
                        log::error!("table {}: dealing failed: {err}", self.name);
                        return;
                    }
                    self.action_timer.arm(self.timings.action_timeout);
                }
                GameState::DealerTurn => {
                    self.action_timer.disarm();
                    if let Err(err) = self.game.play_dealer() {
                        log::error!("table {}: dealer play failed: {err}", self.name);
                        return;
                    }
                }
                GameState::ResolvingBets => {
                    match self.game.resolve_bets() {
                        Ok(results) => {
                            self.persist_results(results).await;
                            crate::metrics::rounds_resolved();
                            self.bet_timer.arm(self.timings.bet_time);
                        }
                        Err(err) => {
                            log::error!("table {}: resolving bets failed: {err}", self.name);
                            return;
                        }
                    }
                }
                GameState::WaitForStart | GameState::PlayerTurn => {
                    self.prompt_current_player();
                    self.broadcast_game_state();
                    return;
                }
            }
            self.broadcast_game_state();
        }
    }

    /// Write each player's round result under their provider username.
    /// Store failures are logged and never end the round.
    async fn persist_results(
        &mut self,
        results: HashMap<Uuid, blackjack::game::RoundResult>,
    ) {
        for (player_id, result) in results {
            let Some(client) = self.clients.get(&player_id) else {
                log::error!(
                    "table {}: no client attached for player {player_id}, result dropped",
                    self.name
                );
                continue;
            };
            if let Err(err) = self.store.record_result(client.username(), &result).await {
                log::error!(
                    "table {}: unable to record result for {}: {err}",
                    self.name,
                    client.username()
                );
            }
        }
    }

    fn remove_inactive_players(&mut self) {
        let stale: Vec<Uuid> = self
            .game
            .seated()
            .filter(|p| p.should_remove(self.timings.grace))
            .map(|p| p.id)
            .collect();
        for id in stale {
            log::info!("table {}: removing player {id} after disconnect", self.name);
            self.game.remove_player(id);
        }
    }

    fn prompt_for_bets(&self) {
        for client in self.clients.values() {
            let needs_bet = self
                .game
                .player(client.id())
                .is_some_and(|p| p.bet == 0 && p.is_active());
            if needs_bet {
                let _ = client.try_queue(ServerMessage::PopUp(PopUpDto::info("Place your bet!")));
            }
        }
    }

    fn prompt_current_player(&self) {
        let Some(id) = self.game.current_player_id() else {
            return;
        };
        let Some(client) = self.clients.get(&id) else {
            log::debug!("table {}: current player {id} has no client attached", self.name);
            return;
        };
        let _ = client.try_queue(ServerMessage::PopUp(PopUpDto::info("It is your turn!")));
    }

    fn warn(&self, client: &Arc<Client>, message: &str) {
        let _ = client.try_queue(ServerMessage::PopUp(PopUpDto::warn(message)));
    }

    /// Non-blocking fan-out of the full game DTO; a client with a full or
    /// closed queue is treated as dead.
    fn broadcast_game_state(&mut self) {
        let msg = ServerMessage::GameState(GameDto::from_game(&self.game));
        let mut dead = Vec::new();
        for (id, client) in &self.clients {
            if client.try_queue(msg.clone()).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            if let Some(client) = self.clients.remove(&id) {
                log::warn!("table {}: client {id} cannot keep up, evicting", self.name);
                client.close();
                if let Some(player) = self.game.player_mut(id) {
                    player.mark_disconnected(false);
                }
            }
        }
        self.publish_occupancy();
    }

    fn publish_occupancy(&self) {
        self.occupancy.store(self.clients.len(), Ordering::Relaxed);
    }
}
