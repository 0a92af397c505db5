//! The per-socket connection actor.
//!
//! Each accepted socket gets one `Client` plus two pumps: the read pump
//! forwards decoded frames to the client's current manager (the lobby or
//! one table), the write pump drains the bounded outbound queue and keeps
//! the connection alive with pings. The manager slot is the only mutable
//! field shared across tasks; it sits behind a mutex so a `leave_table`
//! handoff is atomic with the next inbound dispatch.

use super::rate_limiter::TokenBucket;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use blackjack::protocol::{ClientCommand, PopUpDto, ProtocolError, ServerMessage};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const WRITE_WAIT: Duration = Duration::from_secs(10);
pub const PONG_WAIT: Duration = Duration::from_secs(60);
/// (PONG_WAIT * 9) / 10.
pub const PING_PERIOD: Duration = Duration::from_secs(54);
pub const MAX_MESSAGE_SIZE: usize = 512;
pub const OUTBOUND_BUFFER: usize = 10;

/// An inbound frame routed to whichever actor currently manages the client.
pub struct InboundMessage {
    pub command: ClientCommand,
    pub client: Arc<Client>,
}

/// The actor currently routing a connection's inbound messages. Both the
/// lobby and every table implement this, so the connection actor never
/// holds a concrete pointer to either.
#[async_trait]
pub trait Manager: Send + Sync {
    fn id(&self) -> &str;
    async fn register(&self, client: Arc<Client>);
    async fn unregister(&self, client: Arc<Client>);
    /// Non-blocking: a full mailbox drops the frame rather than stalling
    /// the read pump while it holds the manager lock.
    fn send_message(&self, msg: InboundMessage) -> Result<(), InboundMessage>;
}

pub struct Client {
    id: Uuid,
    username: String,
    connected_at: Instant,
    outbound: mpsc::Sender<ServerMessage>,
    manager: Mutex<Arc<dyn Manager>>,
    shutdown: CancellationToken,
}

impl Client {
    /// Build a client attached to its initial manager. Returns the receiver
    /// end of the outbound queue for the write pump.
    pub fn new(
        username: impl Into<String>,
        manager: Arc<dyn Manager>,
    ) -> (Arc<Self>, mpsc::Receiver<ServerMessage>) {
        let username = username.into();
        let (outbound, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let client = Arc::new(Self {
            // Derived from the provider identity so a reconnecting user
            // maps back onto their seated player.
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, username.as_bytes()),
            username,
            connected_at: Instant::now(),
            outbound,
            manager: Mutex::new(manager),
            shutdown: CancellationToken::new(),
        });
        (client, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Queue a message without blocking. Errors when the queue is full or
    /// the write pump is gone; broadcast paths treat that as a dead client.
    pub fn try_queue(&self, msg: ServerMessage) -> Result<(), ()> {
        self.outbound.try_send(msg).map_err(|_| ())
    }

    pub async fn current_manager(&self) -> Arc<dyn Manager> {
        self.manager.lock().await.clone()
    }

    pub async fn set_manager(&self, manager: Arc<dyn Manager>) {
        *self.manager.lock().await = manager;
    }

    /// Tear the connection down; both pumps watch this token.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn closed(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Dispatch one decoded command to the current manager, holding the
    /// manager lock across the send so a concurrent handoff cannot split
    /// this client's command stream.
    async fn dispatch(self: &Arc<Self>, command: ClientCommand) {
        let manager = self.manager.lock().await;
        let msg = InboundMessage {
            command,
            client: self.clone(),
        };
        if manager.send_message(msg).is_err() {
            log::warn!(
                "client {}: manager {} mailbox full, dropping frame",
                self.id,
                manager.id()
            );
        }
    }
}

/// Read pump: enforce the frame size limit upstream (see the upgrade
/// handler), refresh the read deadline on every pong, rate limit, and
/// forward decoded commands to the current manager. On any read error the
/// current manager is told to unregister the client.
pub async fn read_pump(client: Arc<Client>, mut receiver: SplitStream<WebSocket>) {
    let mut limiter = TokenBucket::per_connection();
    let mut deadline = Instant::now() + PONG_WAIT;

    loop {
        let frame = tokio::select! {
            _ = client.closed().cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => {
                log::info!("client {}: read deadline elapsed", client.id());
                break;
            }
            frame = receiver.next() => frame,
        };

        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(err)) => {
                log::info!("client {}: socket error: {err}", client.id());
                break;
            }
            None => break,
        };

        match msg {
            Message::Pong(_) => {
                deadline = Instant::now() + PONG_WAIT;
            }
            Message::Text(text) => {
                handle_frame(&client, &mut limiter, text.as_str().as_bytes()).await;
            }
            Message::Binary(bytes) => {
                handle_frame(&client, &mut limiter, &bytes).await;
            }
            Message::Close(_) => break,
            Message::Ping(_) => {}
        }
    }

    let manager = client.current_manager().await;
    manager.unregister(client.clone()).await;
    client.close();
}

async fn handle_frame(client: &Arc<Client>, limiter: &mut TokenBucket, raw: &[u8]) {
    // Fold embedded newlines to spaces, then strip the frame's edges.
    let flattened: Vec<u8> = raw
        .iter()
        .map(|&b| if b == b'\n' { b' ' } else { b })
        .collect();
    let trimmed = flattened.as_slice().trim_ascii();

    let command = match ClientCommand::decode(trimmed) {
        Ok(command) => command,
        Err(ProtocolError::UnknownCommand(tag)) => {
            log::warn!("client {}: unknown command {tag:?}", client.id());
            return;
        }
        Err(err) => {
            log::warn!("client {}: bad frame: {err}", client.id());
            return;
        }
    };

    if !limiter.allow() {
        crate::metrics::rate_limited_frames();
        let _ = client.try_queue(ServerMessage::PopUp(PopUpDto::error(
            "Slow down! You are sending messages too quickly",
        )));
        return;
    }

    client.dispatch(command).await;
}

/// Write pump: pings on the ping period, drains the outbound queue as JSON
/// text frames with a per-frame write deadline, and closes the socket on
/// the way out.
pub async fn write_pump(
    client: Arc<Client>,
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerMessage>,
) {
    let mut ping = tokio::time::interval(PING_PERIOD);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping.tick().await; // the immediate first tick

    loop {
        tokio::select! {
            _ = client.closed().cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            _ = ping.tick() => {
                let write = tokio::time::timeout(WRITE_WAIT, sender.send(Message::Ping(Vec::new().into())));
                if write.await.map_or(true, |r| r.is_err()) {
                    break;
                }
            }
            msg = outbound.recv() => {
                let Some(msg) = msg else {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                if write_frame(&mut sender, &msg).await.is_err() {
                    break;
                }
                // Drain whatever else is already queued before sleeping.
                while let Ok(next) = outbound.try_recv() {
                    if write_frame(&mut sender, &next).await.is_err() {
                        client.close();
                        return;
                    }
                }
            }
        }
    }
    client.close();
}

async fn write_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|err| {
        log::error!("unable to encode server message: {err}");
    })?;
    tokio::time::timeout(WRITE_WAIT, sender.send(Message::Text(json.into())))
        .await
        .map_err(|_| ())?
        .map_err(|_| ())
}
