//! Termbridge - Real-time terminal bridge over WebSocket and SSH.
//!
//! This library lets a browser-hosted terminal emulator drive an interactive
//! shell on a remote host: the browser speaks JSON frames over one WebSocket
//! per session, and the bridge relays bytes to and from an SSH transport.
//!
//! # Architecture
//!
//! The bridge follows a client-relay-upstream model:
//!
//! - **Session Controller (client)**: lifecycle state machine + retry policy,
//!   driving the WebSocket from the terminal UI's side
//! - **Relay (server)**: one session per WebSocket, pumping bytes in both
//!   directions with backpressure and exactly-once teardown
//! - **Upstream capability**: the `SshConnector` seam behind which a real SSH
//!   library (or the conformance test double) sits
//!
//! Key design principles:
//!
//! - Sessions are isolated: one fault tears down one session
//! - Output ordering is preserved end to end, byte for byte
//! - The `connect` frame is sent only after the socket's open event
//! - Protocol framing is bit-exact and covered by a round-trip law
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use termbridge::client::{ControllerOptions, SessionController, TerminalEvent};
//! use termbridge::identifiers::ServerId;
//! use termbridge::protocol::ConnectionRequest;
//! use termbridge::relay::{BridgeServer, RelayOptions};
//! use termbridge::upstream::FramedConnector;
//! use termbridge::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Relay side: bind and serve.
//!     let connector = Arc::new(FramedConnector::new());
//!     let server = BridgeServer::bind(connector, RelayOptions::new()).await?;
//!
//!     // Client side: open a session and connect upstream.
//!     let options = ControllerOptions::new(server.ws_url(ServerId::new(1)))?;
//!     let mut controller = SessionController::spawn(options);
//!     controller.connect(ConnectionRequest {
//!         host: "167.86.76.14".to_string(),
//!         port: 22,
//!         username: "root".to_string(),
//!         password: "x".to_string(),
//!     })?;
//!
//!     controller.send_command("echo \"Test successful\"\n")?;
//!     while let Some(event) = controller.next_event().await {
//!         if let TerminalEvent::Output(data) = event {
//!             print!("{data}");
//!             break;
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Session controller: state machine + async driver |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | WebSocket envelope message types |
//! | [`relay`] | Bridge server: accept loop, sessions, registry |
//! | [`upstream`] | SSH transport capability and test double |
//! | [`wire`] | Bit-exact SSH-level framing codec |

// ============================================================================
// Modules
// ============================================================================

/// Session controller: lifecycle state machine and async driver.
///
/// Use [`SessionController::spawn`](client::SessionController::spawn) to run
/// a session against a bridge endpoint.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for bridge entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// WebSocket envelope message types.
///
/// The tagged `type` unions exchanged between client and relay.
pub mod protocol;

/// Bridge server.
///
/// Use [`BridgeServer::bind`](relay::BridgeServer::bind) to start serving
/// sessions.
pub mod relay;

/// Upstream SSH transport capability.
///
/// The [`SshConnector`](upstream::SshConnector) seam, its framing-level
/// implementation, and the conformance test double.
pub mod upstream;

/// SSH-level wire framing codec.
///
/// Banner, auth acknowledgment, and channel-data packet framing.
pub mod wire;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{ControllerOptions, SessionController, SessionMachine, SessionState, TerminalEvent};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ChannelId, ServerId, SessionId};

// Protocol types
pub use protocol::{ClientMessage, ConnectionRequest, ServerMessage};

// Relay types
pub use relay::{BridgeServer, RelayOptions, SessionRegistry};

// Upstream types
pub use upstream::{FramedConnector, MockPeerConfig, MockSshPeer, SshChannel, SshConnector};

// Wire types
pub use wire::{Banner, Packet, PacketDecoder};
