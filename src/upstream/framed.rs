//! Framing-level SSH connector.
//!
//! [`FramedConnector`] speaks exactly the modeled wire contract over plain
//! TCP: it reads the unsolicited banner, requests the userauth service,
//! requires the fixed 9-byte acceptance, then bridges bytes: outgoing
//! command bytes wrapped verbatim in exec channel requests, incoming
//! channel-data packets decoded into ordered output chunks.
//!
//! This is the connector the conformance suite runs against
//! [`MockSshPeer`](super::MockSshPeer). Production deployments replace it
//! with a real SSH client library behind the same
//! [`SshConnector`](super::SshConnector) trait.
//!
//! # Pump Tasks
//!
//! Each connection spawns one task per direction, coordinated by the
//! channel's cancellation signal: whichever leg ends first trips the signal
//! and the other leg exits promptly. The output leg writes into a bounded
//! queue, so a slow consumer pauses socket reads instead of growing memory.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ChannelId;
use crate::protocol::ConnectionRequest;
use crate::wire::banner::MAX_BANNER_LEN;
use crate::wire::{
    AUTH_ACCEPTED_WIRE, Banner, MSG_CHANNEL_DATA, Packet, PacketDecoder, decode_auth_ack,
};

use super::SshConnector;
use super::channel::{ChannelDriver, DEFAULT_OUTPUT_CAPACITY, OutputChunk, SshChannel};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout covering TCP connect, banner, and auth acknowledgment.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket read chunk size for the output pump.
const READ_CHUNK: usize = 8192;

// ============================================================================
// FramedConnector
// ============================================================================

/// SSH connector speaking the modeled framing contract directly over TCP.
///
/// # Example
///
/// ```ignore
/// let connector = FramedConnector::new()
///     .with_connect_timeout(Duration::from_secs(5));
/// let channel = connector.connect(&request).await?;
/// ```
#[derive(Debug, Clone)]
pub struct FramedConnector {
    /// Implementation id announced in our banner.
    software: String,

    /// Timeout for the whole handshake.
    connect_timeout: Duration,

    /// Bound on queued output chunks (the backpressure threshold).
    output_capacity: usize,
}

impl Default for FramedConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl FramedConnector {
    /// Creates a connector with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            software: format!("termbridge_{}", env!("CARGO_PKG_VERSION")),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
        }
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Sets the bound on queued output chunks.
    #[inline]
    #[must_use]
    pub fn with_output_capacity(mut self, output_capacity: usize) -> Self {
        self.output_capacity = output_capacity;
        self
    }

    /// Performs the TCP connect and modeled handshake.
    ///
    /// Returns the stream plus any bytes read past the auth acknowledgment;
    /// those seed the packet decoder so no output is lost.
    async fn handshake(&self, request: &ConnectionRequest) -> Result<(TcpStream, Vec<u8>)> {
        let mut stream = TcpStream::connect((request.host.as_str(), request.port))
            .await
            .map_err(|e| {
                Error::transport(format!("connect to {} failed: {e}", request.target()))
            })?;

        // The peer speaks first: banner, unsolicited.
        let mut acc: Vec<u8> = Vec::new();
        let banner_line: Vec<u8> = loop {
            if let Some(pos) = acc.iter().position(|&b| b == b'\n') {
                let rest = acc.split_off(pos + 1);
                break std::mem::replace(&mut acc, rest);
            }
            if acc.len() > MAX_BANNER_LEN {
                return Err(Error::protocol("no banner line within the length limit"));
            }
            let mut chunk = [0u8; 256];
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::transport("upstream closed before sending its banner"));
            }
            acc.extend_from_slice(&chunk[..n]);
        };

        let text = std::str::from_utf8(&banner_line)
            .map_err(|_| Error::protocol("banner is not valid UTF-8"))?;
        let banner = Banner::decode(text)?;
        debug!(peer = %banner, "upstream banner received");

        // Identify ourselves, then request the userauth service.
        stream
            .write_all(Banner::new(&self.software).encode().as_bytes())
            .await?;
        stream.write_all(&Packet::service_request().encode()).await?;

        // Only the fixed acceptance continues the session; the peer dropping
        // the connection here is a credential rejection.
        loop {
            if acc.len() >= AUTH_ACCEPTED_WIRE.len() {
                if decode_auth_ack(&acc).is_none() {
                    return Err(Error::protocol(
                        "unexpected bytes in place of the auth acknowledgment",
                    ));
                }
                acc.drain(..AUTH_ACCEPTED_WIRE.len());
                break;
            }
            let mut chunk = [0u8; 64];
            match stream.read(&mut chunk).await {
                Ok(0) => {
                    return Err(Error::auth(
                        "upstream closed the connection during authentication",
                    ));
                }
                Ok(n) => acc.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    return Err(Error::auth(format!(
                        "upstream dropped the connection during authentication: {e}"
                    )));
                }
            }
        }

        Ok((stream, acc))
    }
}

// ============================================================================
// SshConnector Implementation
// ============================================================================

#[async_trait]
impl SshConnector for FramedConnector {
    async fn connect(&self, request: &ConnectionRequest) -> Result<SshChannel> {
        let timeout_ms = self.connect_timeout.as_millis() as u64;

        let (stream, leftover) = timeout(self.connect_timeout, self.handshake(request))
            .await
            .map_err(|_| Error::connection_timeout(timeout_ms))??;

        debug!(remote = %request.target(), username = %request.username, "upstream handshake complete");

        let (channel, driver) = SshChannel::pair(self.output_capacity);
        let ChannelDriver {
            input,
            output,
            cancel,
        } = driver;

        let (read_half, write_half) = stream.into_split();
        let decoder = PacketDecoder::with_leftover(leftover);

        tokio::spawn(pump_output(read_half, decoder, output, Arc::clone(&cancel)));
        tokio::spawn(pump_input(write_half, input, cancel));

        Ok(channel)
    }
}

// ============================================================================
// Pump Tasks
// ============================================================================

/// Upstream → session pump: decodes packets, forwards payloads in order.
async fn pump_output(
    mut read_half: OwnedReadHalf,
    mut decoder: PacketDecoder,
    output: mpsc::Sender<OutputChunk>,
    cancel: Arc<watch::Sender<bool>>,
) {
    let mut cancelled = cancel.subscribe();
    let mut buf = vec![0u8; READ_CHUNK];

    // Handshake leftover may already hold complete packets.
    let mut alive = flush_decoded(&mut decoder, &output).await;

    while alive {
        tokio::select! {
            _ = cancelled.changed() => break,

            res = read_half.read(&mut buf) => match res {
                Ok(0) => {
                    debug!("upstream closed the output stream");
                    break;
                }
                Ok(n) => {
                    decoder.push(&buf[..n]);
                    alive = flush_decoded(&mut decoder, &output).await;
                }
                Err(e) => {
                    let _ = output.send(Err(e.into())).await;
                    break;
                }
            },
        }
    }

    cancel.send_replace(true);
}

/// Forwards all currently decodable payloads; returns `false` when the pump
/// must stop (consumer gone or framing error).
async fn flush_decoded(decoder: &mut PacketDecoder, output: &mpsc::Sender<OutputChunk>) -> bool {
    loop {
        match decoder.try_next() {
            Ok(Some(packet)) if packet.msg_type == MSG_CHANNEL_DATA => {
                if output.send(Ok(packet.data)).await.is_err() {
                    return false;
                }
            }
            Ok(Some(packet)) => {
                trace!(msg_type = packet.msg_type, "ignoring non-data frame");
            }
            Ok(None) => return true,
            Err(e) => {
                let _ = output.send(Err(e)).await;
                return false;
            }
        }
    }
}

/// Session → upstream pump: wraps command bytes in exec requests, verbatim.
async fn pump_input(
    mut write_half: OwnedWriteHalf,
    mut input: mpsc::UnboundedReceiver<Vec<u8>>,
    cancel: Arc<watch::Sender<bool>>,
) {
    let mut cancelled = cancel.subscribe();

    loop {
        tokio::select! {
            _ = cancelled.changed() => break,

            maybe = input.recv() => match maybe {
                Some(bytes) => {
                    let wire = Packet::exec_request(ChannelId::main(), &bytes).encode();
                    if let Err(e) = write_half.write_all(&wire).await {
                        warn!(error = %e, "upstream write failed");
                        break;
                    }
                }
                None => break,
            },
        }
    }

    let _ = write_half.shutdown().await;
    cancel.send_replace(true);
}

// ============================================================================
// Tests
// ============================================================================
