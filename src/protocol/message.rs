//! WebSocket envelope message types.
//!
//! Defines the JSON text frames exchanged between the browser client and the
//! relay, discriminated by a `type` field.
//!
//! # Format
//!
//! Client → Server:
//!
//! ```json
//! {"type": "connect", "host": "...", "port": 22, "username": "...", "password": "..."}
//! {"type": "command", "command": "ls\n"}
//! ```
//!
//! Server → Client:
//!
//! ```json
//! {"type": "connected"}
//! {"type": "output", "data": "..."}
//! {"type": "error", "message": "..."}
//! {"type": "disconnected"}
//! ```
//!
//! Unknown `type` values are ignored, never fatal: [`ClientMessage::parse`]
//! and [`ServerMessage::parse`] return `Ok(None)` for them so both ends can
//! skip messages introduced by newer peers.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// ConnectionRequest
// ============================================================================

/// Parameters for one upstream SSH connection attempt.
///
/// Supplied once per session inside the `connect` message and handed to the
/// upstream connector; never persisted, dropped after the handshake completes
/// or fails.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    /// Remote host to connect to.
    pub host: String,

    /// Remote port (22 for standard SSH).
    pub port: u16,

    /// Login username.
    pub username: String,

    /// Login password.
    pub password: String,
}

impl ConnectionRequest {
    /// Returns the `host:port` target string.
    #[inline]
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Credentials must never reach logs; Debug prints a placeholder.
impl fmt::Debug for ConnectionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// ClientMessage
// ============================================================================

/// Messages sent from the browser client to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Request to open the upstream SSH connection.
    Connect {
        /// Connection parameters, flattened into the envelope.
        #[serde(flatten)]
        request: ConnectionRequest,
    },

    /// Raw command bytes for the active SSH input stream.
    Command {
        /// Command text, including control characters.
        command: String,
    },
}

impl ClientMessage {
    /// Message types this end understands.
    const KNOWN_TYPES: &'static [&'static str] = &["connect", "command"];

    /// Parses a text frame into a client message.
    ///
    /// Returns `Ok(None)` when the `type` discriminator is present but
    /// unknown; such messages are skipped, not fatal.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame is not valid JSON
    /// - [`Error::Protocol`] if the discriminator is missing or the payload
    ///   does not match the declared type
    pub fn parse(text: &str) -> Result<Option<Self>> {
        parse_envelope(text, Self::KNOWN_TYPES)
    }

    /// Serializes this message to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// ServerMessage
// ============================================================================

/// Messages sent from the relay to the browser client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// The upstream SSH connection is established.
    Connected,

    /// One chunk of SSH channel output, in production order.
    Output {
        /// Output bytes, lossily decoded to text for the JSON frame.
        data: String,
    },

    /// An error to surface in the terminal view.
    Error {
        /// Human-readable error text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,

        /// Alternate payload field kept for older peers.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },

    /// The session is over; no further output follows.
    Disconnected,
}

impl ServerMessage {
    /// Message types this end understands.
    const KNOWN_TYPES: &'static [&'static str] =
        &["connected", "output", "error", "disconnected"];

    /// Creates an error message.
    #[inline]
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: Some(message.into()),
            data: None,
        }
    }

    /// Creates an output message.
    #[inline]
    #[must_use]
    pub fn output(data: impl Into<String>) -> Self {
        Self::Output { data: data.into() }
    }

    /// Parses a text frame into a server message.
    ///
    /// Returns `Ok(None)` when the `type` discriminator is present but
    /// unknown; such messages are skipped, not fatal.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame is not valid JSON
    /// - [`Error::Protocol`] if the discriminator is missing or the payload
    ///   does not match the declared type
    pub fn parse(text: &str) -> Result<Option<Self>> {
        parse_envelope(text, Self::KNOWN_TYPES)
    }

    /// Serializes this message to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Envelope Parsing
// ============================================================================

/// Parses a tagged JSON envelope, skipping unknown `type` values.
fn parse_envelope<T>(text: &str, known_types: &[&str]) -> Result<Option<T>>
where
    T: serde::de::DeserializeOwned,
{
    let value: Value = serde_json::from_str(text)?;

    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Err(Error::protocol("message missing \"type\" discriminator"));
    };

    if !known_types.contains(&kind) {
        return Ok(None);
    }

    Ok(Some(serde_json::from_value(value)?))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_roundtrip() {
        let json = r#"{"type":"connect","host":"167.86.76.14","port":22,"username":"root","password":"x"}"#;

        let msg = ClientMessage::parse(json).expect("parse").expect("known type");
        let ClientMessage::Connect { request } = &msg else {
            panic!("expected connect");
        };
        assert_eq!(request.host, "167.86.76.14");
        assert_eq!(request.port, 22);
        assert_eq!(request.username, "root");
        assert_eq!(request.password, "x");

        let reencoded = msg.to_json().expect("serialize");
        assert!(reencoded.contains(r#""type":"connect""#));
        assert!(reencoded.contains(r#""host":"167.86.76.14""#));
    }

    #[test]
    fn test_command_with_control_chars() {
        let msg = ClientMessage::Command {
            command: "echo \"Test successful\"\n".to_string(),
        };
        let json = msg.to_json().expect("serialize");
        let parsed = ClientMessage::parse(&json).expect("parse").expect("known type");
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_unknown_type_ignored() {
        let parsed =
            ClientMessage::parse(r#"{"type":"resize","cols":80,"rows":24}"#).expect("parse");
        assert!(parsed.is_none());

        let parsed = ServerMessage::parse(r#"{"type":"heartbeat"}"#).expect("parse");
        assert!(parsed.is_none());
    }

    #[test]
    fn test_missing_type_is_protocol_error() {
        let err = ClientMessage::parse(r#"{"host":"example.com"}"#).unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(ClientMessage::parse("not json").is_err());
    }

    #[test]
    fn test_known_type_bad_payload_is_error() {
        // Declared connect but missing required fields.
        let result = ClientMessage::parse(r#"{"type":"connect","host":"h"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_message_wire_shapes() {
        assert_eq!(
            ServerMessage::Connected.to_json().expect("serialize"),
            r#"{"type":"connected"}"#
        );
        assert_eq!(
            ServerMessage::output("hi").to_json().expect("serialize"),
            r#"{"type":"output","data":"hi"}"#
        );
        assert_eq!(
            ServerMessage::Disconnected.to_json().expect("serialize"),
            r#"{"type":"disconnected"}"#
        );

        let json = ServerMessage::error("boom").to_json().expect("serialize");
        assert_eq!(json, r#"{"type":"error","message":"boom"}"#);
    }

    #[test]
    fn test_error_with_data_field_only() {
        let parsed = ServerMessage::parse(r#"{"type":"error","data":"denied"}"#)
            .expect("parse")
            .expect("known type");
        assert_eq!(
            parsed,
            ServerMessage::Error {
                message: None,
                data: Some("denied".to_string()),
            }
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let request = ConnectionRequest {
            host: "example.com".to_string(),
            port: 22,
            username: "root".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
