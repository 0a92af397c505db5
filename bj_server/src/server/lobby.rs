//! The lobby actor: landing zone for new connections and the table
//! directory.
//!
//! The lobby owns the `name -> table` map and the set of clients not yet
//! attached to any table. Tables run under child cancel tokens; on
//! shutdown the lobby cancels every table and waits for all of them to
//! drain before returning.

use super::client::{Client, InboundMessage, Manager};
use super::table::{TableActor, TableHandle, TableMessage, TableTimings};
use async_trait::async_trait;
use blackjack::game::{Game, GameRules};
use blackjack::protocol::{ClientCommand, PopUpDto, ServerMessage, TableDto};
use blackjack::store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const MAILBOX_BUFFER: usize = 256;

pub enum LobbyMessage {
    Register(Arc<Client>),
    Unregister(Arc<Client>),
    Inbound(InboundMessage),
    /// Sent by a table whose idle timer fired (or by an operator command).
    DeleteTable(String),
}

#[derive(Clone)]
pub struct LobbyHandle {
    tx: mpsc::Sender<LobbyMessage>,
}

impl LobbyHandle {
    /// Ask the lobby to drop a table from its directory.
    pub async fn notify_delete(&self, name: String) {
        if self.tx.send(LobbyMessage::DeleteTable(name)).await.is_err() {
            log::warn!("lobby mailbox closed while requesting table deletion");
        }
    }
}

#[async_trait]
impl Manager for LobbyHandle {
    fn id(&self) -> &str {
        "lobby"
    }

    async fn register(&self, client: Arc<Client>) {
        if self.tx.send(LobbyMessage::Register(client)).await.is_err() {
            log::warn!("lobby register on closed mailbox");
        }
    }

    async fn unregister(&self, client: Arc<Client>) {
        if self
            .tx
            .send(LobbyMessage::Unregister(client))
            .await
            .is_err()
        {
            log::debug!("lobby unregister on closed mailbox");
        }
    }

    fn send_message(&self, msg: InboundMessage) -> Result<(), InboundMessage> {
        self.tx
            .try_send(LobbyMessage::Inbound(msg))
            .map_err(|err| match err.into_inner() {
                LobbyMessage::Inbound(msg) => msg,
                _ => unreachable!("only inbound messages are sent through send_message"),
            })
    }
}

struct TableEntry {
    handle: TableHandle,
    task: JoinHandle<()>,
}

pub struct LobbyActor {
    clients: HashMap<Uuid, Arc<Client>>,
    tables: HashMap<String, TableEntry>,
    inbox: mpsc::Receiver<LobbyMessage>,
    handle: LobbyHandle,
    store: Store,
    rules: GameRules,
    timings: TableTimings,
    cancel: CancellationToken,
}

impl LobbyActor {
    pub fn spawn(
        store: Store,
        rules: GameRules,
        timings: TableTimings,
        cancel: CancellationToken,
    ) -> (LobbyHandle, JoinHandle<()>) {
        let (tx, inbox) = mpsc::channel(MAILBOX_BUFFER);
        let handle = LobbyHandle { tx };
        let actor = Self {
            clients: HashMap::new(),
            tables: HashMap::new(),
            inbox,
            handle: handle.clone(),
            store,
            rules,
            timings,
            cancel,
        };
        let task = tokio::spawn(actor.run());
        (handle, task)
    }

    async fn run(mut self) {
        log::info!("lobby starting");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    log::info!("lobby shutting down");
                    self.shutdown().await;
                    return;
                }
                message = self.inbox.recv() => {
                    let Some(message) = message else {
                        self.shutdown().await;
                        return;
                    };
                    match message {
                        LobbyMessage::Register(client) => self.register_client(client),
                        LobbyMessage::Unregister(client) => self.unregister_client(&client),
                        LobbyMessage::Inbound(msg) => self.handle_command(msg).await,
                        LobbyMessage::DeleteTable(name) => self.delete_table(&name).await,
                    }
                }
            }
        }
    }

    /// Cancel every table, wait for them all to exit, then drop any
    /// clients still attached to the lobby so their sockets close.
    async fn shutdown(&mut self) {
        for (_, entry) in self.tables.drain() {
            entry.handle.cancel_token().cancel();
            reap(entry.task.await);
        }
        for (_, client) in self.clients.drain() {
            client.close();
        }
    }

    fn register_client(&mut self, client: Arc<Client>) {
        log::info!("lobby: registering client {}", client.id());
        self.clients.insert(client.id(), client);
    }

    fn unregister_client(&mut self, client: &Arc<Client>) {
        let id = client.id();
        let is_current = self
            .clients
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, client));
        if is_current {
            log::info!("lobby: unregistering client {id}");
            self.clients.remove(&id);
        }
    }

    async fn handle_command(&mut self, msg: InboundMessage) {
        let client = msg.client;
        log::debug!("lobby: client {} sent {:?}", client.id(), msg.command.tag());

        match msg.command {
            ClientCommand::CreateTable { value } => self.create_table(value, &client),
            ClientCommand::JoinTable { value } => self.join_table(&value, client).await,
            ClientCommand::DeleteTable { value } => {
                if !self.tables.contains_key(&value) {
                    self.warn(&client, "That table does not exist");
                    return;
                }
                self.delete_table(&value).await;
            }
            ClientCommand::TableList => self.send_table_list(&client),
            ClientCommand::GetStats => super::send_user_stats(&self.store, &client).await,
            ClientCommand::PlaceBet { .. }
            | ClientCommand::Hit
            | ClientCommand::Stand
            | ClientCommand::StartGame
            | ClientCommand::DealCards
            | ClientCommand::GetState
            | ClientCommand::LeaveTable => {
                self.warn(&client, "Join a table first");
            }
        }
    }

    fn create_table(&mut self, name: String, client: &Arc<Client>) {
        if self.tables.contains_key(&name) {
            log::warn!("lobby: table {name:?} already exists, not creating");
            self.warn(client, "A table with that name already exists");
            return;
        }
        log::info!("lobby: creating table {name:?}");

        let game = Game::new(self.rules);
        let (handle, task) = TableActor::spawn(
            name.clone(),
            game,
            self.rules.max_players,
            self.handle.clone(),
            self.store.clone(),
            self.timings,
            self.cancel.child_token(),
        );
        self.tables.insert(name, TableEntry { handle, task });
        self.broadcast_table_list();
    }

    async fn join_table(&mut self, name: &str, client: Arc<Client>) {
        let Some(entry) = self.tables.get(name) else {
            log::warn!("lobby: join for missing table {name:?}");
            self.warn(&client, "That table does not exist");
            return;
        };
        let id = client.id();
        client
            .set_manager(Arc::new(entry.handle.clone()))
            .await;
        entry.handle.register(client).await;
        self.clients.remove(&id);
    }

    async fn delete_table(&mut self, name: &str) {
        let Some(entry) = self.tables.remove(name) else {
            log::warn!("lobby: delete for missing table {name:?}");
            return;
        };
        log::info!("lobby: deleting table {name:?}");
        entry.handle.cancel_token().cancel();
        reap(entry.task.await);
        self.broadcast_table_list();
    }

    fn table_dtos(&self) -> Vec<TableDto> {
        self.tables
            .values()
            .map(|entry| TableDto {
                id: entry.handle.name().to_string(),
                capacity: entry.handle.capacity(),
                current_players: entry.handle.occupancy(),
            })
            .collect()
    }

    fn send_table_list(&self, client: &Arc<Client>) {
        let _ = client.try_queue(ServerMessage::TableList(self.table_dtos()));
    }

    fn broadcast_table_list(&self) {
        let msg = ServerMessage::TableList(self.table_dtos());
        for client in self.clients.values() {
            let _ = client.try_queue(msg.clone());
        }
    }

    fn warn(&self, client: &Arc<Client>, message: &str) {
        let _ = client.try_queue(ServerMessage::PopUp(PopUpDto::warn(message)));
    }
}

/// A panicked table is a programming error, not a recoverable condition:
/// re-raise it on the lobby task so the failure is loud.
fn reap(result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        if err.is_panic() {
            std::panic::resume_unwind(err.into_panic());
        }
    }
}
