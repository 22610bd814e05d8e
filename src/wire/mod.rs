//! SSH-level wire framing codec.
//!
//! This module translates between raw bytes on the upstream transport and
//! structured protocol events. It covers exactly the framing a conformant
//! peer (or its test double) must speak:
//!
//! | Frame | Direction | Trigger |
//! |-------|-----------|---------|
//! | Banner `SSH-2.0-<id>\r\n` | Peer → Client | Unsolicited on TCP connect |
//! | Auth acceptance (9 fixed bytes) | Peer → Client | Inbound data contains `"ssh-userauth"` |
//! | Channel data packet | Peer → Client | Inbound data contains `"exec"` |
//!
//! Full SSH key exchange, encryption, and authentication negotiation are the
//! business of a vetted SSH library behind the [`crate::upstream`] boundary;
//! this codec only defines the conformance contract such a library or its
//! test double must satisfy.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `banner` | Protocol-version identification line |
//! | `packet` | Binary packet framing and incremental decoding |

// ============================================================================
// Submodules
// ============================================================================

/// Protocol-version identification line.
pub mod banner;

/// Binary packet framing and incremental decoding.
pub mod packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use banner::Banner;
pub use packet::{
    AUTH_ACCEPTED_WIRE, AuthAccepted, CHANNEL_REQUEST_EXEC, MSG_AUTH_ACCEPTED, MSG_CHANNEL_DATA,
    MSG_CHANNEL_REQUEST, MSG_SERVICE_REQUEST, Packet, PacketDecoder, SERVICE_USERAUTH,
    decode_auth_ack,
};
