//! Integration tests for the relay and the client sessions
//!
//! These tests run a real relay on loopback and talk to it either with raw
//! sockets or with full client sessions.

use client::config::SessionConfig;
use client::game::{ClientWorld, LocalPilot, PLANE_PRESETS};
use client::network::{NetworkSession, SessionHandle};
use server::{RelayConfig, RelayServer};
use shared::{HitMessage, Message, PlayerId, Position};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_test::assert_ok;

async fn start_relay() -> (SocketAddr, Arc<AtomicUsize>) {
    let config = RelayConfig::default().with_bind_addr("127.0.0.1:0".parse().unwrap());
    let relay = assert_ok!(RelayServer::bind(config).await);
    let addr = relay.local_addr().unwrap();
    let counter = relay.connection_counter();
    tokio::spawn(relay.run());
    (addr, counter)
}

/// Polls `condition` until it holds, failing the test after a few seconds
async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        sleep(Duration::from_millis(5)).await;
    }
}

async fn connect_raw(addr: SocketAddr, counter: &AtomicUsize, expected: usize) -> TcpStream {
    let stream = assert_ok!(TcpStream::connect(addr).await);
    wait_until("relay to register client", || {
        counter.load(Ordering::SeqCst) >= expected
    })
    .await;
    stream
}

async fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut received = vec![0u8; len];
    assert_ok!(assert_ok!(
        timeout(Duration::from_secs(3), stream.read_exact(&mut received)).await
    ));
    received
}

async fn assert_silent(stream: &mut TcpStream) {
    let mut buf = [0u8; 64];
    let result = timeout(Duration::from_millis(200), stream.read(&mut buf)).await;
    assert!(result.is_err(), "client received unexpected bytes");
}

fn spawn_client(
    addr: SocketAddr,
    player_id: PlayerId,
    name: &str,
    position: Position,
) -> (Arc<ClientWorld>, SessionHandle) {
    let config = SessionConfig::new(addr);
    let mut pilot = LocalPilot::new(player_id, name, PLANE_PRESETS[2]);
    pilot.position = position;
    let world = Arc::new(ClientWorld::new(pilot, &config));
    let handle = NetworkSession::spawn(config, Arc::clone(&world));
    (world, handle)
}

/// RELAY BEHAVIOUR OVER RAW SOCKETS
mod relay_tests {
    use super::*;

    /// A message from one client reaches every other client and not the sender
    #[tokio::test]
    async fn chat_relayed_verbatim_to_others_only() {
        let (addr, counter) = start_relay().await;
        let mut alice = connect_raw(addr, &counter, 1).await;
        let mut bob = connect_raw(addr, &counter, 2).await;
        let mut carol = connect_raw(addr, &counter, 3).await;

        let chat = br#"{"type":"chat","name":"Alice","text":"hi"}"#;
        alice.write_all(chat).await.unwrap();

        assert_eq!(read_exactly(&mut bob, chat.len()).await, chat.to_vec());
        assert_eq!(read_exactly(&mut carol, chat.len()).await, chat.to_vec());
        assert_silent(&mut alice).await;
    }

    /// Formatting is preserved byte for byte, the relay never re-encodes
    #[tokio::test]
    async fn relay_does_not_reformat() {
        let (addr, counter) = start_relay().await;
        let mut alice = connect_raw(addr, &counter, 1).await;
        let mut bob = connect_raw(addr, &counter, 2).await;

        let message = b"{ \"type\" : \"chat\",\n  \"name\": \"Alice\", \"text\": \"spaced out\" }";
        alice.write_all(message).await.unwrap();

        assert_eq!(read_exactly(&mut bob, message.len()).await, message.to_vec());
    }

    /// A message split across writes is forwarded only once complete
    #[tokio::test]
    async fn split_writes_are_reassembled() {
        let (addr, counter) = start_relay().await;
        let mut alice = connect_raw(addr, &counter, 1).await;
        let mut bob = connect_raw(addr, &counter, 2).await;

        let state = br#"{"type":"state","player_id":1234,"name":"Alice","x":1.5,"y":2,"z":3}"#;
        let (head, tail) = state.split_at(20);
        alice.write_all(head).await.unwrap();
        assert_silent(&mut bob).await;
        alice.write_all(tail).await.unwrap();

        assert_eq!(read_exactly(&mut bob, state.len()).await, state.to_vec());
    }

    /// Several messages in one write arrive as the same bytes
    #[tokio::test]
    async fn concatenated_messages_are_all_relayed() {
        let (addr, counter) = start_relay().await;
        let mut alice = connect_raw(addr, &counter, 1).await;
        let mut bob = connect_raw(addr, &counter, 2).await;

        let first = br#"{"type":"chat","name":"Alice","text":"one"}"#;
        let second = br#"{"type":"chat","name":"Alice","text":"two"}"#;
        let mut both = first.to_vec();
        both.extend_from_slice(second);
        alice.write_all(&both).await.unwrap();

        assert_eq!(read_exactly(&mut bob, both.len()).await, both);
    }

    /// Garbage ahead of a message is dropped, the message still goes through
    #[tokio::test]
    async fn leading_garbage_is_discarded() {
        let (addr, counter) = start_relay().await;
        let mut alice = connect_raw(addr, &counter, 1).await;
        let mut bob = connect_raw(addr, &counter, 2).await;

        let chat = br#"{"type":"chat","name":"Alice","text":"after noise"}"#;
        alice.write_all(b"]]@@").await.unwrap();
        alice.write_all(chat).await.unwrap();

        assert_eq!(read_exactly(&mut bob, chat.len()).await, chat.to_vec());
    }

    /// A closed client is forgotten and the rest keep talking
    #[tokio::test]
    async fn disconnect_removes_client() {
        let (addr, counter) = start_relay().await;
        let mut alice = connect_raw(addr, &counter, 1).await;
        let bob = connect_raw(addr, &counter, 2).await;
        let mut carol = connect_raw(addr, &counter, 3).await;

        drop(bob);
        wait_until("relay to drop bob", || counter.load(Ordering::SeqCst) == 2).await;

        let chat = br#"{"type":"chat","name":"Alice","text":"still here"}"#;
        alice.write_all(chat).await.unwrap();
        assert_eq!(read_exactly(&mut carol, chat.len()).await, chat.to_vec());
    }
}

/// FULL CLIENT SESSIONS THROUGH THE RELAY
mod session_tests {
    use super::*;

    /// Two sessions discover each other from state broadcasts alone
    #[tokio::test]
    async fn sessions_see_each_other() {
        let (addr, _) = start_relay().await;
        let (alice, alice_session) = spawn_client(addr, 1001, "Alice", Position::default());
        let (bob, bob_session) = spawn_client(addr, 2002, "Bob", Position::new(5.0, 5.0, 5.0));

        wait_until("alice to see bob", || {
            alice.remote_players().iter().any(|p| p.name == "Bob")
        })
        .await;
        wait_until("bob to see alice", || {
            bob.remote_players().iter().any(|p| p.name == "Alice")
        })
        .await;

        let bob_seen = &alice.remote_players()[0];
        assert_eq!(bob_seen.player_id, 2002);
        assert_eq!(bob_seen.position, Position::new(5.0, 5.0, 5.0));
        assert_eq!(alice.remote_players().len(), 1);

        alice_session.shutdown();
        bob_session.shutdown();
        alice_session.join().await;
        bob_session.join().await;
    }

    /// The join announcement and chat reach the other pilot
    #[tokio::test]
    async fn chat_reaches_other_session() {
        let (addr, counter) = start_relay().await;
        let (alice, alice_session) = spawn_client(addr, 1001, "Alice", Position::default());
        wait_until("alice to connect", || alice_session.status().is_connected()).await;
        let (bob, bob_session) = spawn_client(addr, 2002, "Bob", Position::default());
        wait_until("both connected", || counter.load(Ordering::SeqCst) == 2).await;

        wait_until("bob's announcement", || {
            alice
                .chat_lines()
                .iter()
                .any(|line| line.text == "Bob has joined the lobby.")
        })
        .await;

        alice.send_chat("hello bob");
        wait_until("chat to arrive", || {
            bob.chat_lines().iter().any(|line| line.text == "hello bob")
        })
        .await;

        alice_session.shutdown();
        bob_session.shutdown();
    }

    /// The attacker detects the hit; the victim applies it to itself
    #[tokio::test]
    async fn hit_detected_by_attacker_damages_victim() {
        let (addr, _) = start_relay().await;
        let (alice, alice_session) = spawn_client(addr, 1001, "Alice", Position::default());
        let (bob, bob_session) = spawn_client(addr, 2002, "Bob", Position::new(0.0, 0.0, -5.1));

        wait_until("alice to see bob", || {
            alice.remote_players().iter().any(|p| p.player_id == 2002)
        })
        .await;

        assert!(alice.fire());
        let reports = alice.simulate_tick();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].message.target_id, 2002);
        assert_eq!(reports[0].message.damage, 30);

        wait_until("bob to take damage", || bob.pilot().health == 70).await;
        assert!(bob.events().contains(&"You were hit by Alice".to_string()));
        assert_eq!(alice.pilot().score, 0);

        alice_session.shutdown();
        bob_session.shutdown();
    }

    /// A kill delivered twice counts one death for the victim and observers
    #[tokio::test]
    async fn duplicated_kill_counts_once() {
        let (addr, counter) = start_relay().await;
        let (bob, bob_session) = spawn_client(addr, 2002, "Bob", Position::default());
        let (carol, carol_session) = spawn_client(addr, 3003, "Carol", Position::default());
        wait_until("sessions connected", || counter.load(Ordering::SeqCst) == 2).await;
        wait_until("carol to see bob", || {
            carol.remote_players().iter().any(|p| p.player_id == 2002)
        })
        .await;

        let mut attacker = connect_raw(addr, &counter, 3).await;
        let kill = Message::Hit(HitMessage {
            target_id: 2002,
            damage: 100,
            attacker_name: "Mallory".to_string(),
            attacker_id: Some(4004),
            is_kill: true,
            event_id: Some(1),
        })
        .encode()
        .unwrap();
        attacker.write_all(&kill).await.unwrap();
        attacker.write_all(&kill).await.unwrap();

        wait_until("bob to be shot down", || bob.pilot().deaths == 1).await;
        sleep(Duration::from_millis(200)).await;

        let bob_pilot = bob.pilot();
        assert_eq!(bob_pilot.deaths, 1);
        assert_eq!(bob_pilot.health, 0);
        let bob_seen_by_carol = carol
            .remote_players()
            .into_iter()
            .find(|p| p.player_id == 2002)
            .unwrap();
        assert_eq!(bob_seen_by_carol.deaths, 1);

        bob_session.shutdown();
        carol_session.shutdown();
    }

    /// Losing the relay leaves sessions disconnected, not crashed
    #[tokio::test]
    async fn session_survives_missing_relay() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (world, session) = spawn_client(addr, 1001, "Alice", Position::default());
        let status = session.join().await;
        assert!(status.status_line().starts_with("Error: "));

        assert!(world.fire());
        world.simulate_tick();
    }
}
