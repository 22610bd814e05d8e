//! WebSocket protocol message types.
//!
//! This module defines the JSON envelope exchanged between the browser client
//! and the relay over one WebSocket per terminal session.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `connect` | Client → Server | Open the upstream SSH connection |
//! | `command` | Client → Server | Raw bytes for the SSH input stream |
//! | `connected` | Server → Client | Upstream handshake succeeded |
//! | `output` | Server → Client | One chunk of SSH channel output |
//! | `error` | Server → Client | Error text for the terminal view |
//! | `disconnected` | Server → Client | Session is over |
//!
//! Unknown `type` values are skipped on both ends rather than treated as
//! fatal, so either peer can be upgraded independently.

// ============================================================================
// Submodules
// ============================================================================

/// Envelope message types and parsing.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{ClientMessage, ConnectionRequest, ServerMessage};
