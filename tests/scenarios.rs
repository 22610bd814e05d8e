//! End-to-end bridge scenarios.
//!
//! Each test wires the full stack (session controller, bridge server,
//! framing connector) against the mock SSH peer, exercising the observable
//! properties of a session: the echo round trip, upstream resets, the retry
//! cap, credential retries, byte fidelity, and session isolation.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use termbridge::client::{
    ControllerOptions, SessionController, SessionState, TerminalEvent,
};
use termbridge::identifiers::ServerId;
use termbridge::protocol::ConnectionRequest;
use termbridge::relay::{BridgeServer, RelayOptions};
use termbridge::upstream::{FramedConnector, MockPeerConfig, MockSshPeer};

// ============================================================================
// Helpers
// ============================================================================

/// Upper bound on any single await in these tests.
const WAIT: Duration = Duration::from_secs(5);

/// Window in which "nothing further happens" assertions watch for events.
const QUIET: Duration = Duration::from_millis(300);

fn request_for(peer: &MockSshPeer) -> ConnectionRequest {
    ConnectionRequest {
        host: peer.host(),
        port: peer.port(),
        username: "root".to_string(),
        password: "x".to_string(),
    }
}

async fn start_bridge() -> Arc<BridgeServer> {
    BridgeServer::bind(Arc::new(FramedConnector::new()), RelayOptions::new())
        .await
        .expect("bridge bind")
}

fn controller_for(server: &BridgeServer, server_id: u64) -> SessionController {
    let options = ControllerOptions::new(server.ws_url(ServerId::new(server_id)))
        .expect("valid endpoint");
    SessionController::spawn(options)
}

/// Awaits the first event matching `pred`, failing the test on timeout.
async fn expect_event<F>(controller: &mut SessionController, what: &str, mut pred: F) -> TerminalEvent
where
    F: FnMut(&TerminalEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            let event = controller
                .next_event()
                .await
                .unwrap_or_else(|| panic!("controller exited while waiting for {what}"));
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

/// Drains events for the quiet window, returning everything seen.
async fn drain_events(controller: &mut SessionController) -> Vec<TerminalEvent> {
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + QUIET;
    loop {
        match timeout(deadline.saturating_duration_since(tokio::time::Instant::now()), controller.next_event()).await {
            Ok(Some(event)) => seen.push(event),
            Ok(None) | Err(_) => return seen,
        }
    }
}

async fn connect_and_wait(controller: &mut SessionController, peer: &MockSshPeer) {
    controller.connect(request_for(peer)).expect("connect");
    expect_event(controller, "connected state", |e| {
        matches!(e, TerminalEvent::StateChanged(SessionState::Connected))
    })
    .await;
}

// ============================================================================
// Scenario: echo round trip
// ============================================================================

#[tokio::test]
async fn scenario_echo_roundtrip() {
    let peer = MockSshPeer::spawn(MockPeerConfig::new().with_response("Test successful\n"))
        .await
        .expect("peer");
    let server = start_bridge().await;
    let mut controller = controller_for(&server, 1);

    connect_and_wait(&mut controller, &peer).await;

    controller
        .send_command("echo \"Test successful\"\n")
        .expect("command");

    let event = expect_event(&mut controller, "output", |e| {
        matches!(e, TerminalEvent::Output(_))
    })
    .await;
    assert_eq!(event, TerminalEvent::Output("Test successful\n".to_string()));

    server.shutdown();
}

// ============================================================================
// Scenario: upstream reset mid-session
// ============================================================================

#[tokio::test]
async fn scenario_upstream_reset_notifies_exactly_once() {
    let peer = MockSshPeer::spawn(MockPeerConfig::new()).await.expect("peer");
    let server = start_bridge().await;
    let mut controller = controller_for(&server, 1);

    connect_and_wait(&mut controller, &peer).await;

    // Kill the upstream out from under the session.
    peer.drop_connections();

    expect_event(&mut controller, "disconnected state", |e| {
        matches!(e, TerminalEvent::StateChanged(SessionState::Disconnected))
    })
    .await;

    // Even with both the `disconnected` frame and the socket close arriving,
    // exactly one notice reaches the terminal.
    let trailing = drain_events(&mut controller).await;
    let notices = trailing
        .iter()
        .filter(|e| matches!(e, TerminalEvent::Notice(_)))
        .count();
    assert_eq!(notices, 0, "no second disconnect notice, got {trailing:?}");

    server.shutdown();
}

#[tokio::test]
async fn scenario_upstream_reset_shows_one_notice() {
    let peer = MockSshPeer::spawn(MockPeerConfig::new()).await.expect("peer");
    let server = start_bridge().await;
    let mut controller = controller_for(&server, 1);

    connect_and_wait(&mut controller, &peer).await;
    peer.drop_connections();

    expect_event(&mut controller, "disconnect notice", |e| {
        matches!(e, TerminalEvent::Notice(text) if text == "Disconnected from server")
    })
    .await;

    server.shutdown();
}

// ============================================================================
// Scenario: retry cap
// ============================================================================

#[tokio::test]
async fn scenario_retry_cap_reached() {
    // A port with nothing behind it: every open attempt is refused.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let dead_port = listener.local_addr().expect("addr").port();
    drop(listener);

    let options = ControllerOptions::new(format!(
        "ws://127.0.0.1:{dead_port}/ws/servers/1/ssh/"
    ))
    .expect("valid endpoint")
    .with_retry_delay(Duration::from_millis(50));
    let mut controller = SessionController::spawn(options);

    controller
        .connect(ConnectionRequest {
            host: "127.0.0.1".to_string(),
            port: 22,
            username: "root".to_string(),
            password: "x".to_string(),
        })
        .expect("connect");

    expect_event(&mut controller, "max retries message", |e| {
        matches!(e, TerminalEvent::Error(text) if text == "Max retries reached")
    })
    .await;
    expect_event(&mut controller, "error state", |e| {
        matches!(e, TerminalEvent::StateChanged(SessionState::Error))
    })
    .await;

    // No further automatic attempts: the controller stays silent.
    let trailing = drain_events(&mut controller).await;
    assert!(
        trailing.is_empty(),
        "no events expected after the terminal failure, got {trailing:?}"
    );
}

// ============================================================================
// Scenario: credential retry on a live session
// ============================================================================

#[tokio::test]
async fn scenario_auth_failure_keeps_session_open() {
    let peer = MockSshPeer::spawn(MockPeerConfig::new().with_reject_auth())
        .await
        .expect("peer");
    let server = start_bridge().await;
    let mut controller = controller_for(&server, 1);

    controller.connect(request_for(&peer)).expect("connect");

    let event = expect_event(&mut controller, "auth error", |e| {
        matches!(e, TerminalEvent::Error(_))
    })
    .await;
    let TerminalEvent::Error(text) = event else {
        unreachable!();
    };
    assert!(
        text.contains("Authentication failed"),
        "error text shown verbatim, got {text:?}"
    );

    // The WebSocket session survived the rejection.
    assert_eq!(server.registry().count(), 1);

    server.shutdown();
}

// ============================================================================
// Scenario: byte fidelity
// ============================================================================

#[tokio::test]
async fn scenario_command_bytes_verbatim() {
    let peer = MockSshPeer::spawn(MockPeerConfig::new()).await.expect("peer");
    let server = start_bridge().await;
    let mut controller = controller_for(&server, 1);

    connect_and_wait(&mut controller, &peer).await;

    // Control characters and all.
    let command = "stty -echo\u{3}\u{1b}[A\n";
    controller.send_command(command).expect("command");

    expect_event(&mut controller, "output", |e| {
        matches!(e, TerminalEvent::Output(_))
    })
    .await;

    let received = peer.received();
    let needle = command.as_bytes();
    assert!(
        received.windows(needle.len()).any(|w| w == needle),
        "command bytes must reach the peer verbatim"
    );

    server.shutdown();
}

// ============================================================================
// Scenario: session isolation
// ============================================================================

#[tokio::test]
async fn scenario_sessions_are_isolated() {
    let peer_a = MockSshPeer::spawn(MockPeerConfig::new().with_response("alpha\n"))
        .await
        .expect("peer");
    let peer_b = MockSshPeer::spawn(MockPeerConfig::new().with_response("bravo\n"))
        .await
        .expect("peer");
    let server = start_bridge().await;

    let mut controller_a = controller_for(&server, 1);
    let mut controller_b = controller_for(&server, 2);

    connect_and_wait(&mut controller_a, &peer_a).await;
    connect_and_wait(&mut controller_b, &peer_b).await;
    assert_eq!(server.registry().count(), 2);

    // Tear down session A's upstream; session B must not notice.
    peer_a.drop_connections();
    expect_event(&mut controller_a, "session A disconnect", |e| {
        matches!(e, TerminalEvent::StateChanged(SessionState::Disconnected))
    })
    .await;

    controller_b.send_command("uptime\n").expect("command");
    let event = expect_event(&mut controller_b, "session B output", |e| {
        matches!(e, TerminalEvent::Output(_))
    })
    .await;
    assert_eq!(event, TerminalEvent::Output("bravo\n".to_string()));

    server.shutdown();
}

// ============================================================================
// Scenario: raw wire behavior of the relay
// ============================================================================

#[tokio::test]
async fn scenario_connected_acknowledged_exactly_once() {
    let peer = MockSshPeer::spawn(MockPeerConfig::new()).await.expect("peer");
    let server = start_bridge().await;

    let url = server.ws_url(ServerId::new(1));
    let (mut ws, _resp) = tokio_tungstenite::connect_async(url.as_str()).await.expect("upgrade");

    let connect_frame = format!(
        r#"{{"type":"connect","host":"{}","port":{},"username":"root","password":"x"}}"#,
        peer.host(),
        peer.port()
    );

    ws.send(Message::Text(connect_frame.clone().into()))
        .await
        .expect("send connect");

    let first = timeout(WAIT, ws.next())
        .await
        .expect("no timeout")
        .expect("frame")
        .expect("ok");
    assert_eq!(
        first.into_text().expect("text").as_str(),
        r#"{"type":"connected"}"#
    );

    // An unknown message type is skipped, and a duplicate connect is ignored:
    // the next frame the relay sends must be command output, not a second
    // acknowledgment.
    ws.send(Message::Text(r#"{"type":"resize","cols":80,"rows":24}"#.into()))
        .await
        .expect("send unknown");
    ws.send(Message::Text(connect_frame.into()))
        .await
        .expect("send duplicate connect");
    ws.send(Message::Text(r#"{"type":"command","command":"ls\n"}"#.into()))
        .await
        .expect("send command");

    let next = timeout(WAIT, ws.next())
        .await
        .expect("no timeout")
        .expect("frame")
        .expect("ok")
        .into_text()
        .expect("text");
    assert!(
        next.contains(r#""type":"output""#),
        "expected output, got {next}"
    );

    server.shutdown();
}

#[tokio::test]
async fn scenario_command_before_connect_is_inline_error() {
    let server = start_bridge().await;

    let url = server.ws_url(ServerId::new(1));
    let (mut ws, _resp) = tokio_tungstenite::connect_async(url.as_str()).await.expect("upgrade");

    ws.send(Message::Text(r#"{"type":"command","command":"ls\n"}"#.into()))
        .await
        .expect("send command");

    let reply = timeout(WAIT, ws.next())
        .await
        .expect("no timeout")
        .expect("frame")
        .expect("ok")
        .into_text()
        .expect("text");
    assert!(reply.contains(r#""type":"error""#), "got {reply}");

    // The session survives an early command.
    ws.send(Message::Text(r#"{"type":"heartbeat"}"#.into()))
        .await
        .expect("session still writable");

    server.shutdown();
}

#[tokio::test]
async fn scenario_malformed_frame_tears_down_session_with_terminal_frames() {
    let server = start_bridge().await;

    let url = server.ws_url(ServerId::new(1));
    let (mut ws, _resp) = tokio_tungstenite::connect_async(url.as_str()).await.expect("upgrade");

    // JSON with a declared type whose payload cannot match.
    ws.send(Message::Text(r#"{"type":"connect","host":42}"#.into()))
        .await
        .expect("send malformed");

    let mut texts = Vec::new();
    while let Ok(Some(Ok(frame))) = timeout(WAIT, ws.next()).await {
        match frame {
            Message::Text(text) => texts.push(text.to_string()),
            Message::Close(_) => break,
            _ => {}
        }
    }

    assert!(
        texts.iter().any(|t| t.contains(r#""type":"error""#)),
        "error frame expected before close, got {texts:?}"
    );
    assert!(
        texts.iter().any(|t| t.contains(r#""type":"disconnected""#)),
        "disconnected frame expected before close, got {texts:?}"
    );

    server.shutdown();
}
