//! Scripted table rounds driven through actor handles with rigged shoes.
//!
//! Time is paused: tokio auto-advances through the bet/action/cleanup
//! timers whenever the test is waiting on a broadcast, so timer-driven
//! behavior (forced stands, grace cleanup) runs deterministically.

use bj_server::server::client::{Client, InboundMessage, Manager};
use bj_server::server::lobby::{LobbyActor, LobbyHandle};
use bj_server::server::table::{TableActor, TableHandle, TableTimings};
use blackjack::game::{Card, Game, GameRules, Shoe, Suit, ACE, KING};
use blackjack::protocol::{ClientCommand, GameDto, ServerMessage};
use blackjack::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn timings() -> TableTimings {
    TableTimings {
        bet_time: Duration::from_secs(30),
        action_timeout: Duration::from_secs(30),
        idle_delete: Duration::from_secs(600),
        grace: chrono::Duration::minutes(3),
    }
}

fn rigged(top: &[u8]) -> Game {
    let cards = top.iter().map(|&r| Card::new(Suit::Spade, r)).collect();
    Game::with_shoe(GameRules::default(), Shoe::from_top(cards, 0))
}

struct Fixture {
    store: Store,
    lobby: LobbyHandle,
    cancel: CancellationToken,
}

async fn fixture() -> Fixture {
    let store = Store::in_memory().await.expect("in-memory store");
    tokio::time::pause();
    let cancel = CancellationToken::new();
    let (lobby, _task) = LobbyActor::spawn(
        store.clone(),
        GameRules::default(),
        timings(),
        cancel.clone(),
    );
    Fixture {
        store,
        lobby,
        cancel,
    }
}

impl Fixture {
    fn spawn_table(&self, name: &str, game: Game, timings: TableTimings) -> TableHandle {
        let (handle, _task) = TableActor::spawn(
            name.to_string(),
            game,
            GameRules::default().max_players,
            self.lobby.clone(),
            self.store.clone(),
            timings,
            self.cancel.child_token(),
        );
        handle
    }

    fn client(&self, username: &str) -> (Arc<Client>, mpsc::Receiver<ServerMessage>) {
        Client::new(username, Arc::new(self.lobby.clone()))
    }
}

fn send(table: &TableHandle, client: &Arc<Client>, command: ClientCommand) {
    let msg = InboundMessage {
        command,
        client: client.clone(),
    };
    assert!(table.send_message(msg).is_ok(), "table mailbox full");
}

/// Receive messages until one matches, burning through broadcasts we do
/// not care about. Virtual-time bounded.
async fn recv_until<F>(rx: &mut mpsc::Receiver<ServerMessage>, mut pred: F) -> ServerMessage
where
    F: FnMut(&ServerMessage) -> bool,
{
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            let msg = rx.recv().await.expect("outbound queue closed");
            if pred(&msg) {
                return msg;
            }
        }
    })
    .await
    .expect("expected message never arrived")
}

fn game_state(msg: &ServerMessage) -> Option<&GameDto> {
    match msg {
        ServerMessage::GameState(dto) => Some(dto),
        _ => None,
    }
}

#[tokio::test]
async fn blackjack_push_returns_the_stake() {
    let fx = fixture().await;
    // Player: A K (blackjack). Dealer: A K (blackjack).
    let table = fx.spawn_table("push", rigged(&[ACE, KING, ACE, KING]), timings());

    let (alice, mut rx) = fx.client("alice");
    table.register(alice.clone()).await;
    recv_until(&mut rx, |m| game_state(m).is_some()).await;

    send(&table, &alice, ClientCommand::PlaceBet { value: "10".into() });

    // No further input: the action timer stands the blackjack hand and the
    // round resolves to a push.
    let settled = recv_until(&mut rx, |m| {
        game_state(m).is_some_and(|dto| {
            dto.players.len() == 1 && dto.players[0].wallet == 100 && dto.players[0].bet == 0
        })
    })
    .await;
    let dto = game_state(&settled).unwrap();
    assert!(dto.players[0].hand.cards.is_empty());

    let user = fx.store.get_user("alice").await.unwrap().unwrap();
    assert_eq!(user.hands_played, 1);
    assert_eq!(user.blackjacks, 1);
    assert_eq!(user.hands_won, 0);
    assert_eq!(user.hands_lost, 0);
    assert_eq!(user.wallet, 100);
}

#[tokio::test]
async fn busting_loses_the_bet() {
    let fx = fixture().await;
    // Player: 10 10, hits into a third 10. Dealer: 10 10.
    let table = fx.spawn_table("bust", rigged(&[10, 10, 10, 10, 10]), timings());

    let (bob, mut rx) = fx.client("bob");
    table.register(bob.clone()).await;
    recv_until(&mut rx, |m| game_state(m).is_some()).await;

    send(&table, &bob, ClientCommand::PlaceBet { value: "10".into() });
    recv_until(&mut rx, |m| {
        game_state(m).is_some_and(|dto| dto.players[0].hand.cards.len() == 2)
    })
    .await;

    send(&table, &bob, ClientCommand::Hit);

    recv_until(&mut rx, |m| {
        game_state(m).is_some_and(|dto| dto.players[0].wallet == 90 && dto.players[0].bet == 0)
    })
    .await;

    let user = fx.store.get_user("bob").await.unwrap().unwrap();
    assert_eq!(user.hands_played, 1);
    assert_eq!(user.hands_lost, 1);
    assert_eq!(user.total_lost, 10);
    assert_eq!(user.wallet, 90);
}

#[tokio::test]
async fn timer_stands_an_idle_player() {
    let fx = fixture().await;
    // Player: 10 9 (19). Dealer: 10 8 (18). Player never acts.
    let table = fx.spawn_table("afk", rigged(&[10, 9, 10, 8]), timings());

    let (carol, mut rx) = fx.client("carol");
    table.register(carol.clone()).await;
    recv_until(&mut rx, |m| game_state(m).is_some()).await;

    send(&table, &carol, ClientCommand::PlaceBet { value: "10".into() });

    // 30 virtual seconds later the action timer stands carol; 19 beats 18.
    recv_until(&mut rx, |m| {
        game_state(m).is_some_and(|dto| dto.players[0].wallet == 110 && dto.players[0].bet == 0)
    })
    .await;

    let user = fx.store.get_user("carol").await.unwrap().unwrap();
    assert_eq!(user.hands_won, 1);
    assert_eq!(user.total_won, 10);
}

#[tokio::test]
async fn reconnect_within_grace_keeps_seat_and_wallet() {
    let fx = fixture().await;
    let table = fx.spawn_table("grace", rigged(&[10, 9, 10, 8, 5, 5, 5, 5]), timings());

    let (alice, mut rx) = fx.client("alice");
    table.register(alice.clone()).await;
    recv_until(&mut rx, |m| game_state(m).is_some()).await;
    send(&table, &alice, ClientCommand::PlaceBet { value: "10".into() });
    recv_until(&mut rx, |m| {
        game_state(m).is_some_and(|dto| dto.players[0].hand.cards.len() == 2)
    })
    .await;

    // The socket drops mid-round.
    table.unregister(alice.clone()).await;

    // A new connection with the same authenticated identity lands on the
    // same seat: bet and session wallet survive.
    let (alice2, mut rx2) = fx.client("alice");
    assert_eq!(alice.id(), alice2.id());
    table.register(alice2.clone()).await;

    let state = recv_until(&mut rx2, |m| game_state(m).is_some()).await;
    let dto = game_state(&state).unwrap();
    assert_eq!(dto.players.len(), 1);
    assert_eq!(dto.players[0].bet, 10);
    assert_eq!(dto.players[0].wallet, 90);
}

#[tokio::test]
async fn expired_grace_frees_the_seat() {
    let fx = fixture().await;
    // Zero grace: the next cleanup tick removes any disconnected player.
    let mut short = timings();
    short.grace = chrono::Duration::zero();
    let table = fx.spawn_table("expire", rigged(&[10, 9, 10, 8, 5, 5, 5, 5]), short);

    let (dave, mut rx) = fx.client("dave");
    table.register(dave.clone()).await;
    recv_until(&mut rx, |m| game_state(m).is_some()).await;
    send(&table, &dave, ClientCommand::PlaceBet { value: "10".into() });
    recv_until(&mut rx, |m| {
        game_state(m).is_some_and(|dto| dto.players[0].bet == 10)
    })
    .await;

    table.unregister(dave.clone()).await;
    // Let a cleanup tick pass.
    tokio::time::sleep(Duration::from_secs(6)).await;

    // Rejoining now seats a fresh player funded from the store.
    let (dave2, mut rx2) = fx.client("dave");
    table.register(dave2.clone()).await;
    let state = recv_until(&mut rx2, |m| game_state(m).is_some()).await;
    let dto = game_state(&state).unwrap();
    assert_eq!(dto.players.len(), 1);
    assert_eq!(dto.players[0].bet, 0);
    assert_eq!(dto.players[0].wallet, 100);
}

#[tokio::test]
async fn leave_table_hands_the_client_back_to_the_lobby() {
    let fx = fixture().await;
    let table = fx.spawn_table("leave", rigged(&[10, 9, 10, 8, 5, 5]), timings());

    let (erin, mut rx) = fx.client("erin");
    table.register(erin.clone()).await;
    erin.set_manager(Arc::new(table.clone())).await;
    recv_until(&mut rx, |m| game_state(m).is_some()).await;

    send(&table, &erin, ClientCommand::LeaveTable);

    // Once the handoff lands, the manager pointer is the lobby again and
    // lobby commands route normally.
    let listed = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let manager = erin.current_manager().await;
            if manager.id() == "lobby" {
                let msg = InboundMessage {
                    command: ClientCommand::TableList,
                    client: erin.clone(),
                };
                if manager.send_message(msg).is_ok() {
                    break recv_until(&mut rx, |m| matches!(m, ServerMessage::TableList(_)))
                        .await;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("client never returned to the lobby");

    match listed {
        // The table was spawned directly, so the lobby directory is empty.
        ServerMessage::TableList(tables) => assert!(tables.is_empty()),
        other => panic!("expected table list, got {other:?}"),
    }
}

#[tokio::test]
async fn wrong_turn_actions_get_a_warning() {
    let fx = fixture().await;
    let table = fx.spawn_table(
        "warns",
        rigged(&[5, 6, 5, 6, 10, 9, 5, 5, 5, 5]),
        timings(),
    );

    let (frank, mut rx_f) = fx.client("frank");
    let (grace, mut rx_g) = fx.client("grace");
    table.register(frank.clone()).await;
    table.register(grace.clone()).await;
    recv_until(&mut rx_f, |m| game_state(m).is_some()).await;

    send(&table, &frank, ClientCommand::PlaceBet { value: "10".into() });
    send(&table, &grace, ClientCommand::PlaceBet { value: "10".into() });

    // Wait for the deal; frank acts first.
    recv_until(&mut rx_g, |m| {
        game_state(m).is_some_and(|dto| dto.players.iter().any(|p| p.current))
    })
    .await;

    send(&table, &grace, ClientCommand::Hit);
    recv_until(&mut rx_g, |m| {
        matches!(m, ServerMessage::PopUp(p) if p.message.contains("not your turn"))
    })
    .await;
}

#[tokio::test]
async fn cancelling_the_root_token_closes_clients() {
    let fx = fixture().await;
    let table = fx.spawn_table("doomed", rigged(&[10, 9, 10, 8]), timings());

    let (henry, mut rx) = fx.client("henry");
    table.register(henry.clone()).await;
    recv_until(&mut rx, |m| game_state(m).is_some()).await;

    fx.cancel.cancel();
    tokio::time::timeout(Duration::from_secs(60), henry.closed().cancelled())
        .await
        .expect("client never shut down");
}
