//! Integration tests for the networked session
//!
//! Every test runs a real server on an ephemeral port and talks to it over TCP,
//! either through raw framed transports or through the headless client.

use assert_approx_eq::assert_approx_eq;
use server::config::ServerConfig;
use server::network::Server;
use shared::payload::{game_message, parse, OtherMovement, PlayerInfo, RoundResult, SeatAssignment};
use shared::transport::split_tcp;
use shared::{
    Action, AuthAction, GameAction, MapDescriptor, Message, MessageReader, MessageWriter, Role,
    Vec2,
};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn test_map(catchers: usize, runners: usize, time_ms: u32) -> MapDescriptor {
    MapDescriptor {
        name: "arena".to_string(),
        round_count: 3,
        time_limit_ms: time_ms,
        size: Vec2::new(1000.0, 600.0),
        catcher_starts: (0..catchers)
            .map(|i| Vec2::new(100.0, 100.0 + 100.0 * i as f32))
            .collect(),
        runner_starts: (0..runners)
            .map(|i| Vec2::new(900.0, 100.0 + 100.0 * i as f32))
            .collect(),
        wall_rects: vec![],
    }
}

async fn start_server(map: MapDescriptor, password: &str) -> SocketAddr {
    let config = ServerConfig {
        ip: "127.0.0.1".to_string(),
        port: 0,
        password: password.to_string(),
        map_path: String::new(),
    };
    let server = Server::bind(&config, map, 20).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

/// A connection speaking the wire protocol directly
struct RawPeer {
    reader: MessageReader<OwnedReadHalf>,
    writer: MessageWriter<OwnedWriteHalf>,
    inbox: VecDeque<Message>,
}

impl RawPeer {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = split_tcp(stream);
        Self {
            reader,
            writer,
            inbox: VecDeque::new(),
        }
    }

    async fn send(&mut self, message: Message) {
        self.writer.send(&message).await.unwrap();
    }

    async fn fill(&mut self, limit: Duration) -> bool {
        match timeout(limit, self.reader.receive()).await {
            Ok(Ok(batch)) => {
                self.inbox.extend(batch.into_iter().map(|m| m.unwrap()));
                true
            }
            Ok(Err(_)) | Err(_) => false,
        }
    }

    async fn next(&mut self) -> Message {
        while self.inbox.is_empty() {
            assert!(self.fill(WAIT).await, "no message within {:?}", WAIT);
        }
        self.inbox.pop_front().unwrap()
    }

    /// Skips ahead to the next message with `action`
    async fn expect(&mut self, action: impl Into<Action>) -> Message {
        let action = action.into();
        loop {
            let message = self.next().await;
            if message.action == action {
                return message;
            }
        }
    }

    /// Everything that arrives within `window`
    async fn drain_for(&mut self, window: Duration) -> Vec<Message> {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline || !self.fill(deadline - now).await {
                break;
            }
        }
        self.inbox.drain(..).collect()
    }

    async fn login(addr: SocketAddr, password: &str, name: &str) -> (Self, SeatAssignment) {
        let mut peer = Self::connect(addr).await;
        peer.send(Message::auth(AuthAction::Connect)).await;
        peer.expect(AuthAction::RequestPassword).await;
        peer.send(Message::with_params(AuthAction::ResponsePassword, password))
            .await;
        peer.expect(AuthAction::RequestName).await;
        peer.send(Message::with_params(AuthAction::ResponseName, name))
            .await;
        peer.expect(AuthAction::Success).await;
        let seat: SeatAssignment = parse(&peer.expect(GameAction::GamePos).await).unwrap();
        (peer, seat)
    }

    /// Connects and answers the password prompt, stopping at `request_name`
    async fn at_name_prompt(addr: SocketAddr) -> Self {
        let mut peer = Self::connect(addr).await;
        peer.send(Message::auth(AuthAction::Connect)).await;
        peer.expect(AuthAction::RequestPassword).await;
        peer.send(Message::auth(AuthAction::ResponsePassword)).await;
        peer.expect(AuthAction::RequestName).await;
        peer
    }

    async fn send_movement(&mut self, trajectory: &[Vec2]) {
        let json = serde_json::to_string(trajectory).unwrap();
        self.send(Message::with_params(GameAction::Movement, json)).await;
    }
}

fn count(messages: &[Message], action: GameAction) -> usize {
    messages
        .iter()
        .filter(|m| m.action == Action::Game(action))
        .count()
}

/// HANDSHAKE TESTS
mod handshake_tests {
    use super::*;

    /// The server's replies arrive in protocol order and end in a seat
    #[tokio::test]
    async fn handshake_reply_order() {
        let addr = start_server(test_map(1, 1, 1000), "pw").await;
        let mut peer = RawPeer::connect(addr).await;

        peer.send(Message::auth(AuthAction::Connect)).await;
        assert_eq!(peer.next().await.action, Action::Auth(AuthAction::RequestPassword));
        peer.send(Message::with_params(AuthAction::ResponsePassword, "pw"))
            .await;
        assert_eq!(peer.next().await.action, Action::Auth(AuthAction::SuccessPassword));
        assert_eq!(peer.next().await.action, Action::Auth(AuthAction::RequestName));
        peer.send(Message::with_params(AuthAction::ResponseName, "alice"))
            .await;
        assert_eq!(peer.next().await.action, Action::Auth(AuthAction::SuccessName));

        let uuid_msg = peer.next().await;
        assert_eq!(uuid_msg.action, Action::Auth(AuthAction::Uuid));
        let uuid = uuid_msg.parameters.unwrap();
        assert!(uuid::Uuid::parse_str(&uuid).is_ok());

        assert_eq!(peer.next().await.action, Action::Auth(AuthAction::Success));
        let map = peer.next().await;
        assert_eq!(map.action, Action::Game(GameAction::Map));
        let map = MapDescriptor::from_json(map.parameters.as_deref().unwrap()).unwrap();
        assert_eq!(map.capacity(), 2);

        let seat: SeatAssignment = parse(&peer.next().await).unwrap();
        assert_eq!(seat.uuid, uuid);
        assert_eq!(seat.role, Role::Catcher);
        assert_eq!(seat.position, Vec2::new(100.0, 100.0));
    }

    /// A wrong password rejects the attempt but the connection may retry
    #[tokio::test]
    async fn wrong_password_then_retry() {
        let addr = start_server(test_map(1, 1, 1000), "secret").await;
        let mut peer = RawPeer::connect(addr).await;

        peer.send(Message::auth(AuthAction::Connect)).await;
        peer.expect(AuthAction::RequestPassword).await;
        peer.send(Message::with_params(AuthAction::ResponsePassword, "nope"))
            .await;
        assert_eq!(peer.next().await.action, Action::Auth(AuthAction::WrongPassword));

        peer.send(Message::auth(AuthAction::Connect)).await;
        peer.expect(AuthAction::RequestPassword).await;
        peer.send(Message::with_params(AuthAction::ResponsePassword, "secret"))
            .await;
        assert_eq!(peer.next().await.action, Action::Auth(AuthAction::SuccessPassword));
    }

    /// The connection after the last free seat is told the field is full
    #[tokio::test]
    async fn capacity_plus_one_gets_field_full() {
        let addr = start_server(test_map(1, 1, 1000), "").await;
        let (first, _) = RawPeer::login(addr, "", "a").await;
        let (_second, _) = RawPeer::login(addr, "", "b").await;

        let mut third = RawPeer::connect(addr).await;
        third.send(Message::auth(AuthAction::Connect)).await;
        assert_eq!(third.next().await.action, Action::Auth(AuthAction::FieldFull));

        // a freed seat can be taken by re-issuing connect on the same connection
        drop(first);
        tokio::time::sleep(Duration::from_millis(100)).await;
        third.send(Message::auth(AuthAction::Connect)).await;
        assert_eq!(third.next().await.action, Action::Auth(AuthAction::RequestPassword));
    }

    /// Two connections answering with the same name at once seat exactly one
    #[tokio::test]
    async fn concurrent_same_name_seats_one() {
        let addr = start_server(test_map(1, 2, 1000), "").await;
        let mut a = RawPeer::at_name_prompt(addr).await;
        let mut b = RawPeer::at_name_prompt(addr).await;

        tokio::join!(
            a.send(Message::with_params(AuthAction::ResponseName, "twin")),
            b.send(Message::with_params(AuthAction::ResponseName, "twin")),
        );
        let (first, second) = tokio::join!(a.next(), b.next());

        let mut replies = vec![first.action, second.action];
        replies.sort_by_key(|action| action.as_str());
        assert_eq!(
            replies,
            vec![
                Action::Auth(AuthAction::NameTaken),
                Action::Auth(AuthAction::SuccessName),
            ]
        );
    }

    /// Two connections racing for the last seat seat exactly one
    #[tokio::test]
    async fn concurrent_last_seat_seats_one() {
        let addr = start_server(test_map(1, 0, 1000), "").await;
        let mut a = RawPeer::at_name_prompt(addr).await;
        let mut b = RawPeer::at_name_prompt(addr).await;

        tokio::join!(
            a.send(Message::with_params(AuthAction::ResponseName, "a")),
            b.send(Message::with_params(AuthAction::ResponseName, "b")),
        );
        let (first, second) = tokio::join!(a.next(), b.next());

        let mut replies = vec![first.action, second.action];
        replies.sort_by_key(|action| action.as_str());
        assert_eq!(
            replies,
            vec![
                Action::Auth(AuthAction::FieldFull),
                Action::Auth(AuthAction::SuccessName),
            ]
        );
    }

    /// A name held by a seated player is never seated twice
    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let addr = start_server(test_map(1, 2, 1000), "").await;
        let (_alice, _) = RawPeer::login(addr, "", "alice").await;

        let mut imposter = RawPeer::connect(addr).await;
        imposter.send(Message::auth(AuthAction::Connect)).await;
        imposter.expect(AuthAction::RequestName).await;
        imposter
            .send(Message::with_params(AuthAction::ResponseName, "alice"))
            .await;
        assert_eq!(imposter.next().await.action, Action::Auth(AuthAction::NameTaken));

        let (_bob, seat) = RawPeer::login(addr, "", "bob").await;
        assert_eq!(seat.seat, 1);
    }
}

/// SESSION TESTS
mod session_tests {
    use super::*;

    /// Joins are announced to the players already seated
    #[tokio::test]
    async fn roster_announcements() {
        let addr = start_server(test_map(1, 1, 1000), "").await;
        let (mut a, a_seat) = RawPeer::login(addr, "", "a").await;
        let (mut b, b_seat) = RawPeer::login(addr, "", "b").await;

        let joined: PlayerInfo = parse(&a.expect(GameAction::NewPlayer).await).unwrap();
        assert_eq!(joined.uuid, b_seat.uuid);
        assert_eq!(joined.role, Role::Runner);

        // the newcomer was already told about `a` during its welcome
        let existing: PlayerInfo = parse(&b.expect(GameAction::NewPlayer).await).unwrap();
        assert_eq!(existing.uuid, a_seat.uuid);

        drop(b);
        let gone = a.expect(GameAction::PlayerDisconnected).await;
        assert_eq!(gone.parameters.as_deref(), Some(b_seat.uuid.as_str()));
    }

    /// Two ready players on a two seat map start exactly one countdown
    #[tokio::test]
    async fn countdown_starts_once() {
        let addr = start_server(test_map(1, 1, 1000), "").await;
        let (mut a, _) = RawPeer::login(addr, "", "a").await;
        let (mut b, _) = RawPeer::login(addr, "", "b").await;

        a.send(Message::with_params(GameAction::Ready, "1")).await;
        b.send(Message::with_params(GameAction::Ready, "1")).await;
        a.expect(GameAction::StartCountdown).await;
        b.expect(GameAction::StartCountdown).await;

        // flipping a flag after the start does not cancel or repeat it
        a.send(Message::with_params(GameAction::Ready, "0")).await;
        a.send(Message::with_params(GameAction::Ready, "1")).await;
        let later_a = a.drain_for(Duration::from_millis(300)).await;
        let later_b = b.drain_for(Duration::from_millis(300)).await;
        assert_eq!(count(&later_a, GameAction::StartCountdown), 0);
        assert_eq!(count(&later_b, GameAction::StartCountdown), 0);
        assert_eq!(count(&later_b, GameAction::SwitchReadyStatus), 2);
    }

    /// Trajectories are relayed and the server announces the winner
    #[tokio::test]
    async fn full_round_result() {
        let addr = start_server(test_map(1, 1, 500), "").await;
        let (mut catcher, catcher_seat) = RawPeer::login(addr, "", "catcher").await;
        let (mut runner, runner_seat) = RawPeer::login(addr, "", "runner").await;
        assert_eq!(catcher_seat.role, Role::Catcher);

        catcher.send(Message::with_params(GameAction::Ready, "1")).await;
        runner.send(Message::with_params(GameAction::Ready, "1")).await;
        catcher.expect(GameAction::StartCountdown).await;
        runner.expect(GameAction::StartCountdown).await;

        let still: Vec<Vec2> = vec![Vec2::new(100.0, 100.0); 10];
        let approach: Vec<Vec2> = (0..10)
            .map(|i| Vec2::new(500.0 - 40.0 * i as f32, 100.0))
            .collect();
        catcher.send_movement(&still).await;
        runner.send_movement(&approach).await;

        let relayed: OtherMovement =
            parse(&catcher.expect(GameAction::OtherMovement).await).unwrap();
        assert_eq!(relayed.uuid, runner_seat.uuid);
        assert_eq!(relayed.trajectory, approach);

        for peer in [&mut catcher, &mut runner] {
            peer.expect(GameAction::StartSimulation).await;
            let result: RoundResult = parse(&peer.expect(GameAction::Result).await).unwrap();
            assert_eq!(result.winner, Role::Catcher);
            assert!(result.collision);
            // runner reaches x = 140 at sample 9
            assert_approx_eq!(result.time_ms, 450.0, 1e-3);
            assert_eq!(result.round, 1);
        }
    }

    /// A seat freed during a round stays closed until the round has a result
    #[tokio::test]
    async fn mid_round_join_waits_for_lobby() {
        let addr = start_server(test_map(1, 2, 500), "").await;
        let (mut catcher, _) = RawPeer::login(addr, "", "catcher").await;
        let (mut r1, _) = RawPeer::login(addr, "", "r1").await;
        let (mut r2, _) = RawPeer::login(addr, "", "r2").await;

        for peer in [&mut catcher, &mut r1, &mut r2] {
            peer.send(Message::with_params(GameAction::Ready, "1")).await;
        }
        catcher.expect(GameAction::StartCountdown).await;
        r1.expect(GameAction::StartCountdown).await;

        drop(r2);
        catcher.expect(GameAction::PlayerDisconnected).await;

        let mut late = RawPeer::connect(addr).await;
        late.send(Message::auth(AuthAction::Connect)).await;
        assert_eq!(late.next().await.action, Action::Auth(AuthAction::FieldFull));

        catcher.send_movement(&[Vec2::new(100.0, 100.0); 10]).await;
        r1.send_movement(&[Vec2::new(900.0, 100.0); 10]).await;
        for peer in [&mut catcher, &mut r1] {
            let result: RoundResult = parse(&peer.expect(GameAction::Result).await).unwrap();
            assert_eq!(result.winner, Role::Runner);
        }

        late.send(Message::auth(AuthAction::Connect)).await;
        assert_eq!(late.next().await.action, Action::Auth(AuthAction::RequestPassword));
    }

    /// Movement outside a running round is a rejected message, not a dropped link
    #[tokio::test]
    async fn early_movement_keeps_connection() {
        let addr = start_server(test_map(1, 1, 1000), "").await;
        let (mut a, _) = RawPeer::login(addr, "", "a").await;
        a.send_movement(&[Vec2::ZERO]).await;
        a.send(game_message(GameAction::Ready, &1).unwrap()).await;

        let (_b, _) = RawPeer::login(addr, "", "b").await;
        a.expect(GameAction::NewPlayer).await;
    }
}

/// CLIENT TESTS
mod client_tests {
    use super::*;
    use client::network::{connect, Client, ClientConfig, ClientError, ConnectFailure};

    fn config(addr: SocketAddr, name: &str, seed: u64) -> ClientConfig {
        ClientConfig {
            server: addr.to_string(),
            name: name.to_string(),
            countdown_ms: 100.0,
            seed,
            ..ClientConfig::default()
        }
    }

    /// Two headless clients play a round and agree on the server's result
    #[tokio::test]
    async fn headless_clients_play_a_round() {
        let addr = start_server(test_map(1, 1, 500), "").await;

        let mut catcher = Client::new(config(addr, "catcher", 1));
        let mut runner = Client::new(config(addr, "runner", 2));
        let catcher_task = tokio::spawn(async move { catcher.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let runner_task = tokio::spawn(async move { runner.run().await });

        let catcher_results = timeout(Duration::from_secs(15), catcher_task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let runner_results = timeout(Duration::from_secs(15), runner_task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(catcher_results.len(), 1);
        assert_eq!(catcher_results, runner_results);
    }

    /// A client arriving at a full session is rejected
    #[tokio::test]
    async fn headless_client_sees_field_full() {
        let addr = start_server(test_map(1, 0, 500), "").await;
        let (_seated, _) = RawPeer::login(addr, "", "first").await;

        let mut late = Client::new(config(addr, "late", 3));
        let result = timeout(WAIT, late.run()).await.unwrap();
        assert!(matches!(
            result,
            Err(ClientError::Rejected(shared::RejectReason::FieldFull))
        ));
    }

    #[tokio::test]
    async fn connect_failures_are_distinct() {
        assert!(matches!(
            connect("no-port-here", WAIT).await,
            Err(ConnectFailure::InvalidAddress(_))
        ));
        assert!(matches!(
            connect("127.0.0.1:99999", WAIT).await,
            Err(ConnectFailure::InvalidAddress(_))
        ));

        // grab a free port, then close it again
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(matches!(
            connect(&addr.to_string(), WAIT).await,
            Err(ConnectFailure::Refused(_))
        ));
    }
}
