//! Per-session byte pump.
//!
//! One task per WebSocket connection brokers the upstream SSH channel: client
//! frames dispatch through [`ClientMessage`], upstream output flows back as
//! `output` frames in production order, and teardown closes both transports
//! exactly once with a terminal frame sent first.
//!
//! # Failure Policy
//!
//! | Fault | Session outcome |
//! |-------|-----------------|
//! | Auth rejection | `error` frame, session stays open for a retry |
//! | Transport failure | `error` + `disconnected`, torn down |
//! | Protocol violation | `error` + `disconnected`, torn down, logged |
//! | Client or upstream close | `disconnected` where deliverable, torn down |
//!
//! Faults never propagate past the session: the registry entry is removed and
//! every other session keeps running.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ServerId, SessionId};
use crate::protocol::{ClientMessage, ConnectionRequest, ServerMessage};
use crate::upstream::{OutputChunk, SshChannel, SshConnector};

use super::registry::SessionRegistry;

// ============================================================================
// Types
// ============================================================================

/// Write half of the session's WebSocket.
type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Read half of the session's WebSocket.
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

// ============================================================================
// CloseReason
// ============================================================================

/// Why a session ended; decides the terminal frame.
#[derive(Debug)]
enum CloseReason {
    /// The client closed its WebSocket.
    ClientClosed,

    /// The upstream SSH channel ended cleanly.
    UpstreamClosed,

    /// Registry-driven cancellation (server shutdown).
    Cancelled,

    /// A transport leg failed.
    Transport(Error),

    /// The upstream violated the framing contract.
    Protocol(Error),
}

/// Outcome of handling one event inside the session loop.
enum Step {
    Continue,
    Close(CloseReason),
}

// ============================================================================
// Session Entry Point
// ============================================================================

/// Runs one terminal session to completion.
///
/// Spawned by the accept loop after the WebSocket upgrade; removes itself
/// from `registry` on exit.
pub(crate) async fn run(
    ws: WebSocketStream<TcpStream>,
    session_id: SessionId,
    server_id: ServerId,
    connector: Arc<dyn SshConnector>,
    registry: Arc<SessionRegistry>,
    mut cancel: watch::Receiver<bool>,
) {
    info!(session_id = %session_id, server_id = %server_id, "session started");

    let (mut ws_sink, mut ws_stream) = ws.split();
    let mut upstream: Option<SshChannel> = None;

    let reason = pump(
        &mut ws_sink,
        &mut ws_stream,
        &mut upstream,
        &connector,
        &mut cancel,
    )
    .await;

    close(ws_sink, upstream, &reason).await;
    registry.remove(session_id);

    info!(session_id = %session_id, reason = ?reason, "session closed");
}

// ============================================================================
// Event Loop
// ============================================================================

/// Runs the session's select loop until a close reason emerges.
async fn pump(
    ws_sink: &mut WsSink,
    ws_stream: &mut WsStream,
    upstream: &mut Option<SshChannel>,
    connector: &Arc<dyn SshConnector>,
    cancel: &mut watch::Receiver<bool>,
) -> CloseReason {
    loop {
        let step = tokio::select! {
            changed = cancel.changed() => {
                // A dropped sender means the registry entry is gone too.
                if changed.is_err() || *cancel.borrow() {
                    Step::Close(CloseReason::Cancelled)
                } else {
                    Step::Continue
                }
            }

            msg = ws_stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_text(ws_sink, upstream, connector, text.as_str()).await
                }

                Some(Ok(Message::Ping(payload))) => {
                    match ws_sink.send(Message::Pong(payload)).await {
                        Ok(()) => Step::Continue,
                        Err(e) => Step::Close(CloseReason::Transport(e.into())),
                    }
                }

                Some(Ok(Message::Close(_))) | None => {
                    debug!("client closed the WebSocket");
                    Step::Close(CloseReason::ClientClosed)
                }

                // Binary, Pong, raw frames carry nothing for us.
                Some(Ok(_)) => Step::Continue,

                Some(Err(e)) => Step::Close(CloseReason::Transport(e.into())),
            },

            chunk = read_upstream(upstream), if upstream.is_some() => match chunk {
                Some(Ok(bytes)) => {
                    let data = String::from_utf8_lossy(&bytes).into_owned();
                    match send_frame(ws_sink, &ServerMessage::output(data)).await {
                        Ok(()) => Step::Continue,
                        Err(e) => Step::Close(CloseReason::Transport(e)),
                    }
                }
                Some(Err(e)) if e.is_protocol() => Step::Close(CloseReason::Protocol(e)),
                Some(Err(e)) => Step::Close(CloseReason::Transport(e)),
                None => {
                    debug!("upstream channel ended");
                    Step::Close(CloseReason::UpstreamClosed)
                }
            },
        };

        match step {
            Step::Continue => {}
            Step::Close(reason) => return reason,
        }
    }
}

/// Awaits the next upstream chunk, or parks forever when no upstream exists.
///
/// Always used behind an `upstream.is_some()` guard; the pending branch only
/// covers the guard's race window.
async fn read_upstream(upstream: &mut Option<SshChannel>) -> Option<OutputChunk> {
    match upstream {
        Some(channel) => channel.read().await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Client Message Handling
// ============================================================================

/// Dispatches one client text frame.
async fn handle_text(
    ws_sink: &mut WsSink,
    upstream: &mut Option<SshChannel>,
    connector: &Arc<dyn SshConnector>,
    text: &str,
) -> Step {
    match ClientMessage::parse(text) {
        Ok(Some(ClientMessage::Connect { request })) => {
            handle_connect(ws_sink, upstream, connector, request).await
        }
        Ok(Some(ClientMessage::Command { command })) => {
            handle_command(ws_sink, upstream, command).await
        }
        Ok(None) => {
            trace!("ignoring unknown client message type");
            Step::Continue
        }
        Err(e) => {
            warn!(error = %e, "malformed client frame");
            Step::Close(CloseReason::Protocol(e))
        }
    }
}

/// Opens the upstream connection and acknowledges it exactly once.
async fn handle_connect(
    ws_sink: &mut WsSink,
    upstream: &mut Option<SshChannel>,
    connector: &Arc<dyn SshConnector>,
    request: ConnectionRequest,
) -> Step {
    if upstream.is_some() {
        warn!("duplicate connect request ignored");
        return Step::Continue;
    }

    // The request lives only for this call; credentials are not retained.
    match connector.connect(&request).await {
        Ok(channel) => {
            *upstream = Some(channel);
            info!(remote = %request.target(), "upstream connected");
            reply(ws_sink, &ServerMessage::Connected).await
        }
        Err(e) if e.is_auth() => {
            // Session stays open: the client may retry with new credentials
            // over the same WebSocket.
            warn!(remote = %request.target(), error = %e, "upstream rejected authentication");
            reply(ws_sink, &ServerMessage::error(e.to_string())).await
        }
        Err(e) => {
            error!(remote = %request.target(), error = %e, "upstream connect failed");
            Step::Close(CloseReason::Transport(e))
        }
    }
}

/// Forwards command bytes to the upstream input stream, unmodified.
async fn handle_command(
    ws_sink: &mut WsSink,
    upstream: &mut Option<SshChannel>,
    command: String,
) -> Step {
    match upstream {
        Some(channel) => match channel.write(command.into_bytes()) {
            Ok(()) => Step::Continue,
            Err(_) => Step::Close(CloseReason::UpstreamClosed),
        },
        None => reply(ws_sink, &ServerMessage::error("no active SSH connection")).await,
    }
}

/// Sends a frame, mapping failure to a transport close.
async fn reply(ws_sink: &mut WsSink, msg: &ServerMessage) -> Step {
    match send_frame(ws_sink, msg).await {
        Ok(()) => Step::Continue,
        Err(e) => Step::Close(CloseReason::Transport(e)),
    }
}

/// Serializes and sends one server frame.
async fn send_frame(ws_sink: &mut WsSink, msg: &ServerMessage) -> Result<()> {
    let json = msg.to_json()?;
    ws_sink.send(Message::Text(json.into())).await?;
    Ok(())
}

// ============================================================================
// Teardown
// ============================================================================

/// Closes both transports exactly once.
///
/// The terminal frame goes out before the WebSocket close; delivery is best
/// effort since the socket may already be gone.
async fn close(mut ws_sink: WsSink, upstream: Option<SshChannel>, reason: &CloseReason) {
    match reason {
        CloseReason::ClientClosed => {}
        CloseReason::UpstreamClosed | CloseReason::Cancelled => {
            let _ = send_frame(&mut ws_sink, &ServerMessage::Disconnected).await;
        }
        CloseReason::Transport(e) => {
            let _ = send_frame(&mut ws_sink, &ServerMessage::error(e.to_string())).await;
            let _ = send_frame(&mut ws_sink, &ServerMessage::Disconnected).await;
        }
        CloseReason::Protocol(e) => {
            error!(error = %e, "session ended by protocol violation");
            let _ = send_frame(&mut ws_sink, &ServerMessage::error(e.to_string())).await;
            let _ = send_frame(&mut ws_sink, &ServerMessage::Disconnected).await;
        }
    }

    let _ = ws_sink.close().await;

    if let Some(channel) = upstream {
        channel.close();
    }
}
