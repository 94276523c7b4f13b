//! Integration tests for the TCP transport through the public `Connection`
//! API.
//!
//! Every test drives a real loopback socket.  States are observed through
//! `Connection::subscribe`, which replays the current state first, so each
//! expected sequence starts with `NONE`.

use std::time::{Duration, Instant};

use padlink::{ConnectionFactory, SendError, StateStream};
use padlink_core::{ConnectionPhase, ConnectionState, ConnectionType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const STEP: Duration = Duration::from_secs(5);

fn tcp(phase: ConnectionPhase) -> ConnectionState {
    ConnectionState::Tcp(phase)
}

/// Waits for the next state, failing the test if none arrives in time.
async fn next_state(states: &mut StateStream) -> ConnectionState {
    tokio::time::timeout(STEP, states.next())
        .await
        .expect("state within timeout")
        .expect("state stream open")
}

/// Asserts that no further state is emitted for a short while.
async fn assert_quiet(states: &mut StateStream) {
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(states.try_next(), None);
}

/// Returns a loopback port with nothing listening on it.
fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn config(port: u16, timeout_secs: u64) -> String {
    format!(r#"{{"host":"127.0.0.1","port":{port},"timeoutSecs":{timeout_secs}}}"#)
}

// ── Happy path ────────────────────────────────────────────────────────────────

/// The canonical session: connect to a local receiver on port 9002, send one
/// event, tear down.
#[tokio::test]
async fn test_tcp_connect_send_and_tear_down() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:9002").await.unwrap();
    let conn = ConnectionFactory::new()
        .build(ConnectionType::Tcp, &config(9002, 5))
        .unwrap();
    let mut states = conn.subscribe();
    assert_eq!(next_state(&mut states).await, ConnectionState::None);

    // Act – connect
    conn.setup();
    let (mut receiver, _) = listener.accept().await.unwrap();

    // Assert – CONNECTING then CONNECTED
    assert_eq!(next_state(&mut states).await, tcp(ConnectionPhase::Connecting));
    assert_eq!(next_state(&mut states).await, tcp(ConnectionPhase::Connected));

    // Act – send
    conn.send_data("xyz").outcome().await.unwrap();

    // Assert – one newline-terminated line on the wire
    let mut line = [0u8; 4];
    receiver.read_exact(&mut line).await.unwrap();
    assert_eq!(&line, b"xyz\n");

    // Act – tear down
    conn.tear_down();

    // Assert – orderly shutdown and the receiver sees EOF
    assert_eq!(next_state(&mut states).await, tcp(ConnectionPhase::Disconnecting));
    assert_eq!(next_state(&mut states).await, tcp(ConnectionPhase::Disconnected));
    let mut rest = Vec::new();
    receiver.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_tcp_events_arrive_in_submission_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let conn = ConnectionFactory::new()
        .build(ConnectionType::Tcp, &config(port, 5))
        .unwrap();
    let mut states = conn.subscribe();
    conn.setup();
    let (mut receiver, _) = listener.accept().await.unwrap();
    states.wait_for(ConnectionState::is_connected).await.unwrap();

    // Queue everything without awaiting individual deliveries.
    let deliveries: Vec<_> = (0..20).map(|i| conn.send_data(format!("slider,{i}"))).collect();
    for delivery in deliveries {
        delivery.outcome().await.unwrap();
    }
    conn.shutdown().await;

    let mut received = String::new();
    receiver.read_to_string(&mut received).await.unwrap();
    let expected: String = (0..20).map(|i| format!("slider,{i}\n")).collect();
    assert_eq!(received, expected);
}

// ── Failure paths ─────────────────────────────────────────────────────────────

/// With nothing listening the connection ends in exactly one timeout state
/// within the configured window.
#[tokio::test]
async fn test_tcp_refused_ends_in_single_timeout() {
    // Arrange
    let conn = ConnectionFactory::new()
        .build(ConnectionType::Tcp, &config(unused_port(), 1))
        .unwrap();
    let mut states = conn.subscribe();
    assert_eq!(next_state(&mut states).await, ConnectionState::None);
    let started = Instant::now();

    // Act
    conn.setup();

    // Assert
    assert_eq!(next_state(&mut states).await, tcp(ConnectionPhase::Connecting));
    assert_eq!(
        next_state(&mut states).await,
        tcp(ConnectionPhase::ConnectionTimeout)
    );
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_quiet(&mut states).await;
}

#[tokio::test]
async fn test_tcp_send_before_connect_is_not_delivered() {
    // Arrange – a listener that would record anything sent to it
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let conn = ConnectionFactory::new()
        .build(ConnectionType::Tcp, &config(port, 5))
        .unwrap();

    // Act
    let outcome = conn.send_data("early").outcome().await;

    // Assert
    assert_eq!(outcome, Err(SendError::NotConnected));
    assert_eq!(conn.state(), ConnectionState::None);
    let accepted = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(accepted.is_err(), "nothing may connect before setup");
}

#[tokio::test]
async fn test_tcp_peer_close_is_link_loss() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let conn = ConnectionFactory::new()
        .build(ConnectionType::Tcp, &config(port, 5))
        .unwrap();
    let mut states = conn.subscribe();
    conn.setup();
    let (receiver, _) = listener.accept().await.unwrap();
    states.wait_for(ConnectionState::is_connected).await.unwrap();

    drop(receiver);

    assert_eq!(next_state(&mut states).await, tcp(ConnectionPhase::Disconnected));
    assert_eq!(
        conn.send_data("after loss").outcome().await,
        Err(SendError::NotConnected)
    );
}

#[tokio::test]
async fn test_tcp_reconnects_after_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let conn = ConnectionFactory::new()
        .build(ConnectionType::Tcp, &config(port, 5))
        .unwrap();
    let mut states = conn.subscribe();

    conn.setup();
    let (_first, _) = listener.accept().await.unwrap();
    states.wait_for(ConnectionState::is_connected).await.unwrap();
    conn.tear_down();
    states
        .wait_for(|s| *s == tcp(ConnectionPhase::Disconnected))
        .await
        .unwrap();

    conn.setup();
    let (mut second, _) = listener.accept().await.unwrap();
    states.wait_for(ConnectionState::is_connected).await.unwrap();
    conn.send_data("again").outcome().await.unwrap();

    let mut line = [0u8; 6];
    second.read_exact(&mut line).await.unwrap();
    assert_eq!(&line, b"again\n");
    second.shutdown().await.unwrap();
}

// ── Teardown edge cases ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_tcp_tear_down_without_setup_emits_nothing() {
    let conn = ConnectionFactory::new()
        .build(ConnectionType::Tcp, &config(9, 5))
        .unwrap();
    let mut states = conn.subscribe();
    assert_eq!(next_state(&mut states).await, ConnectionState::None);

    conn.tear_down();
    conn.tear_down();

    assert_quiet(&mut states).await;
    assert_eq!(conn.state(), ConnectionState::None);
}

#[tokio::test]
async fn test_tcp_double_tear_down_emits_one_disconnected() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let conn = ConnectionFactory::new()
        .build(ConnectionType::Tcp, &config(port, 5))
        .unwrap();
    let mut states = conn.subscribe();
    conn.setup();
    let (_receiver, _) = listener.accept().await.unwrap();
    states.wait_for(ConnectionState::is_connected).await.unwrap();

    // Act
    conn.tear_down();
    conn.tear_down();

    // Assert
    assert_eq!(next_state(&mut states).await, tcp(ConnectionPhase::Disconnecting));
    assert_eq!(next_state(&mut states).await, tcp(ConnectionPhase::Disconnected));
    assert_quiet(&mut states).await;
}

#[tokio::test]
async fn test_tcp_tear_down_during_connect_cancels_attempt() {
    // Arrange – refused connects keep retrying inside a long window
    let conn = ConnectionFactory::new()
        .build(ConnectionType::Tcp, &config(unused_port(), 30))
        .unwrap();
    let mut states = conn.subscribe();
    conn.setup();
    states
        .wait_for(|s| *s == tcp(ConnectionPhase::Connecting))
        .await
        .unwrap();
    let started = Instant::now();

    // Act
    conn.tear_down();

    // Assert – no timeout state, and the cancel is immediate
    assert_eq!(next_state(&mut states).await, tcp(ConnectionPhase::Disconnecting));
    assert_eq!(next_state(&mut states).await, tcp(ConnectionPhase::Disconnected));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_tcp_shutdown_does_not_wait_on_receiver_that_never_reads() {
    // Arrange – the receiver accepts but never reads, so the socket buffers fill
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let conn = ConnectionFactory::new()
        .build(ConnectionType::Tcp, &config(port, 5))
        .unwrap();
    let mut states = conn.subscribe();
    conn.setup();
    let (_receiver, _) = listener.accept().await.unwrap();
    states.wait_for(|s| s.is_connected()).await.unwrap();

    let chunk = "x".repeat(1024 * 1024);
    let deliveries: Vec<_> = (0..64).map(|_| conn.send_data(chunk.clone())).collect();

    // Act
    conn.tear_down();
    let finished = tokio::time::timeout(Duration::from_secs(10), conn.shutdown()).await;

    // Assert
    assert!(finished.is_ok(), "shutdown blocked behind a stalled write");
    let mut cancelled = 0;
    for delivery in deliveries {
        if delivery.outcome().await == Err(SendError::Cancelled) {
            cancelled += 1;
        }
    }
    assert!(cancelled > 0);
}
