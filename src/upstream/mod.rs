//! Upstream SSH transport capability.
//!
//! This module is the boundary behind which a real SSH implementation sits.
//! The relay only ever sees the [`SshConnector`] trait and the
//! [`SshChannel`] it yields; everything about key exchange, encryption, and
//! authentication negotiation is the connector's business.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   connect()    ┌──────────────────┐      TCP       ┌────────────┐
//! │ SessionTask  │───────────────►│  SshConnector    │───────────────►│ SSH peer   │
//! │  (relay)     │◄── SshChannel ─│  implementation  │◄───────────────│ or double  │
//! └──────────────┘                └──────────────────┘                └────────────┘
//! ```
//!
//! Two implementations ship with the crate:
//!
//! | Implementation | Purpose |
//! |----------------|---------|
//! | [`FramedConnector`] | Speaks exactly the modeled wire contract over TCP |
//! | [`MockSshPeer`] | Conformance test double standing in for a real peer |
//!
//! Production deployments substitute a vetted SSH client library (russh or
//! similar) behind the same trait; that library is deliberately not
//! reimplemented here.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | Session ↔ transport byte channel with bounded output |
//! | `framed` | Framing-level TCP connector |
//! | `double` | Mock SSH peer enforcing the wire contract |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::ConnectionRequest;

// ============================================================================
// Submodules
// ============================================================================

/// Session ↔ transport byte channel.
pub mod channel;

/// Conformance test double.
pub mod double;

/// Framing-level TCP connector.
pub mod framed;

// ============================================================================
// SshConnector
// ============================================================================

/// Capability for opening upstream SSH connections.
///
/// One connect call per session. Implementations map credential rejection to
/// [`Error::Auth`](crate::Error::Auth) and socket failures to
/// [`Error::Transport`](crate::Error::Transport) so the relay can apply the
/// right session policy. The request must not be retained after the call
/// returns.
#[async_trait]
pub trait SshConnector: Send + Sync + 'static {
    /// Opens a connection to `request.host:request.port` and completes the
    /// handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::Auth`](crate::Error::Auth) if the peer rejects credentials
    /// - [`Error::Transport`](crate::Error::Transport) or
    ///   [`Error::ConnectionTimeout`](crate::Error::ConnectionTimeout) on
    ///   socket failure
    /// - [`Error::Protocol`](crate::Error::Protocol) if the peer violates the
    ///   wire contract
    async fn connect(&self, request: &ConnectionRequest) -> Result<channel::SshChannel>;
}

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{ChannelDriver, DEFAULT_OUTPUT_CAPACITY, OutputChunk, SshChannel};
pub use double::{MockPeerConfig, MockSshPeer};
pub use framed::FramedConnector;
