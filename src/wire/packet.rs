//! Binary packet framing for the upstream transport.
//!
//! # Packet Layout
//!
//! ```text
//! ┌──────────────┬─────────────┬────────────────────┬────────────────┬──────────┐
//! │ length (4BE) │ msgType (1) │ recipientChan (4BE)│ dataLen (4BE)  │ data (N) │
//! └──────────────┴─────────────┴────────────────────┴────────────────┴──────────┘
//! ```
//!
//! Invariant: `length == 9 + N`. The length field covers msgType, channel,
//! dataLen and data, excluding itself. [`PacketDecoder`] enforces this and
//! yields [`Error::Protocol`] for inconsistent frames; a malformed frame
//! terminates only the offending session, never the relay.
//!
//! The auth acceptance is the one frame that does NOT follow this layout: it
//! is the literal 9-byte sequence [`AUTH_ACCEPTED_WIRE`] with a length field
//! of 12 that nothing else accounts for. Its message type (6) is a test-double
//! convention, not a normative SSH constant, so it is matched byte-for-byte
//! rather than decoded generically.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};
use crate::identifiers::ChannelId;

// ============================================================================
// Constants
// ============================================================================

/// Service request message type (`SSH_MSG_SERVICE_REQUEST`).
pub const MSG_SERVICE_REQUEST: u8 = 5;

/// Auth acceptance message type used by conformant peers.
///
/// Not a normative SSH success code; kept only because the wire contract
/// fixes it.
pub const MSG_AUTH_ACCEPTED: u8 = 6;

/// Channel data message type (`SSH_MSG_CHANNEL_DATA`).
pub const MSG_CHANNEL_DATA: u8 = 94;

/// Channel request message type (`SSH_MSG_CHANNEL_REQUEST`).
pub const MSG_CHANNEL_REQUEST: u8 = 98;

/// Service name whose presence in client-sent bytes triggers the auth
/// acceptance reply.
pub const SERVICE_USERAUTH: &str = "ssh-userauth";

/// Channel request name whose presence in client-sent bytes triggers a
/// channel-data reply.
pub const CHANNEL_REQUEST_EXEC: &str = "exec";

/// The fixed 9-byte auth acceptance frame.
///
/// Length field = 12, message type = 6, four zero bytes.
pub const AUTH_ACCEPTED_WIRE: [u8; 9] = [0x00, 0x00, 0x00, 0x0C, 0x06, 0x00, 0x00, 0x00, 0x00];

/// Bytes covered by the length field besides the payload.
const PACKET_OVERHEAD: usize = 9;

/// Sanity cap on the declared packet length.
///
/// Anything larger is treated as a framing error rather than buffered.
const MAX_PACKET_LEN: usize = 1024 * 1024;

// ============================================================================
// AuthAccepted
// ============================================================================

/// Marker for a recognized auth acceptance frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthAccepted;

/// Recognizes the fixed auth acceptance frame at the start of `buf`.
///
/// Returns `None` when the buffer does not begin with the 9-byte sequence;
/// callers with fewer than 9 bytes should keep reading.
#[inline]
#[must_use]
pub fn decode_auth_ack(buf: &[u8]) -> Option<AuthAccepted> {
    buf.starts_with(&AUTH_ACCEPTED_WIRE).then_some(AuthAccepted)
}

// ============================================================================
// Packet
// ============================================================================

/// A structured transport packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Message type discriminator.
    pub msg_type: u8,

    /// Recipient channel.
    pub recipient_channel: ChannelId,

    /// Payload bytes.
    pub data: Vec<u8>,
}

// ============================================================================
// Packet - Constructors
// ============================================================================

impl Packet {
    /// Creates a channel data packet.
    #[inline]
    #[must_use]
    pub fn channel_data(channel: ChannelId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            msg_type: MSG_CHANNEL_DATA,
            recipient_channel: channel,
            data: payload.into(),
        }
    }

    /// Creates the userauth service request.
    ///
    /// Carries [`SERVICE_USERAUTH`] in its payload so a conformant peer sees
    /// the literal substring and replies with the auth acceptance.
    #[inline]
    #[must_use]
    pub fn service_request() -> Self {
        Self {
            msg_type: MSG_SERVICE_REQUEST,
            recipient_channel: ChannelId::main(),
            data: SERVICE_USERAUTH.as_bytes().to_vec(),
        }
    }

    /// Creates an exec channel request carrying `command` verbatim.
    ///
    /// The payload is the request name [`CHANNEL_REQUEST_EXEC`] followed by
    /// the command bytes unmodified, so the peer both sees the trigger
    /// substring and receives the command byte-for-byte.
    #[inline]
    #[must_use]
    pub fn exec_request(channel: ChannelId, command: &[u8]) -> Self {
        let mut data = Vec::with_capacity(CHANNEL_REQUEST_EXEC.len() + command.len());
        data.extend_from_slice(CHANNEL_REQUEST_EXEC.as_bytes());
        data.extend_from_slice(command);
        Self {
            msg_type: MSG_CHANNEL_REQUEST,
            recipient_channel: channel,
            data,
        }
    }
}

// ============================================================================
// Packet - Encoding
// ============================================================================

impl Packet {
    /// Encodes the packet to its wire representation.
    ///
    /// The length field is computed as `9 + data.len()` per the framing
    /// invariant.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let data_len = self.data.len();
        let mut wire = Vec::with_capacity(4 + PACKET_OVERHEAD + data_len);

        wire.extend_from_slice(&((PACKET_OVERHEAD + data_len) as u32).to_be_bytes());
        wire.push(self.msg_type);
        wire.extend_from_slice(&self.recipient_channel.as_u32().to_be_bytes());
        wire.extend_from_slice(&(data_len as u32).to_be_bytes());
        wire.extend_from_slice(&self.data);

        wire
    }
}

// ============================================================================
// PacketDecoder
// ============================================================================

/// Incremental packet decoder over a byte stream.
///
/// Accumulates bytes with [`push`](Self::push) and yields complete packets in
/// arrival order via [`try_next`](Self::try_next). A partial frame yields
/// nothing until the remaining bytes arrive.
#[derive(Debug, Default)]
pub struct PacketDecoder {
    buf: Vec<u8>,
}

impl PacketDecoder {
    /// Creates an empty decoder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder seeded with bytes already read from the stream.
    #[inline]
    #[must_use]
    pub fn with_leftover(leftover: impl Into<Vec<u8>>) -> Self {
        Self {
            buf: leftover.into(),
        }
    }

    /// Appends freshly received bytes.
    #[inline]
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns the number of buffered, not yet decoded bytes.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Attempts to decode the next complete packet.
    ///
    /// Returns `Ok(None)` when the buffer holds only a partial frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] when the declared length is inconsistent
    /// with the frame contents: shorter than the fixed header, beyond the
    /// sanity cap, or disagreeing with the inner data length.
    pub fn try_next(&mut self) -> Result<Option<Packet>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }

        let length = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]])
            as usize;

        if length < PACKET_OVERHEAD {
            return Err(Error::protocol(format!(
                "declared packet length {length} shorter than the {PACKET_OVERHEAD}-byte header"
            )));
        }
        if length > MAX_PACKET_LEN {
            return Err(Error::protocol(format!(
                "declared packet length {length} exceeds cap {MAX_PACKET_LEN}"
            )));
        }

        let total = 4 + length;
        if self.buf.len() < total {
            return Ok(None);
        }

        let msg_type = self.buf[4];
        let recipient_channel = u32::from_be_bytes([
            self.buf[5],
            self.buf[6],
            self.buf[7],
            self.buf[8],
        ]);
        let data_len = u32::from_be_bytes([
            self.buf[9],
            self.buf[10],
            self.buf[11],
            self.buf[12],
        ]) as usize;

        if data_len != length - PACKET_OVERHEAD {
            return Err(Error::protocol(format!(
                "data length {data_len} disagrees with declared packet length {length}"
            )));
        }

        let data = self.buf[13..total].to_vec();
        self.buf.drain(..total);

        Ok(Some(Packet {
            msg_type,
            recipient_channel: ChannelId::new(recipient_channel),
            data,
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================
