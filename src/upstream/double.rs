//! Conformance test double for an SSH peer.
//!
//! [`MockSshPeer`] is a TCP listener that enforces the bit-exact wire
//! contract: per accepted connection it sends the banner unsolicited, answers
//! inbound data containing `"ssh-userauth"` with the fixed 9-byte acceptance,
//! and answers inbound data containing `"exec"` with one channel-data packet
//! carrying a configured response.
//!
//! It is NOT a production component. It stands in for a real SSH peer so the
//! relay and connector can be exercised end to end without key exchange or
//! encryption. It also records every inbound byte so tests can assert byte
//! fidelity of the relayed stream.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::Result;
use crate::identifiers::ChannelId;
use crate::wire::{AUTH_ACCEPTED_WIRE, Banner, CHANNEL_REQUEST_EXEC, Packet, SERVICE_USERAUTH};

// ============================================================================
// Constants
// ============================================================================

/// Accept-poll interval so the loop can observe the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Cap on the marker scan buffer per connection.
const MAX_PENDING: usize = 64 * 1024;

/// Tail kept when trimming, so a marker split across reads still matches.
const MARKER_TAIL: usize = 16;

// ============================================================================
// MockPeerConfig
// ============================================================================

/// Behavior of the mock peer.
#[derive(Debug, Clone)]
pub struct MockPeerConfig {
    /// Implementation id announced in the banner.
    pub software: String,

    /// Payload of the channel-data reply to an `exec` trigger.
    pub response: String,

    /// Drop the connection instead of acknowledging authentication.
    pub reject_auth: bool,
}

impl Default for MockPeerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPeerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            software: "mockssh_1.0".to_string(),
            response: "Test successful\n".to_string(),
            reject_auth: false,
        }
    }

    /// Sets the exec response payload.
    #[inline]
    #[must_use]
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = response.into();
        self
    }

    /// Sets the banner implementation id.
    #[inline]
    #[must_use]
    pub fn with_software(mut self, software: impl Into<String>) -> Self {
        self.software = software.into();
        self
    }

    /// Makes the peer reject authentication by dropping the connection.
    #[inline]
    #[must_use]
    pub fn with_reject_auth(mut self) -> Self {
        self.reject_auth = true;
        self
    }
}

// ============================================================================
// MockSshPeer
// ============================================================================

/// A mock SSH peer bound to a random localhost port.
///
/// # Example
///
/// ```ignore
/// let peer = MockSshPeer::spawn(MockPeerConfig::new()).await?;
/// let request = ConnectionRequest { host: peer.host(), port: peer.port(), .. };
/// ```
pub struct MockSshPeer {
    /// Bound address.
    addr: SocketAddr,

    /// Stops the accept loop.
    shutdown: Arc<AtomicBool>,

    /// Accept loop task.
    accept_task: JoinHandle<()>,

    /// Per-connection tasks, abortable for mid-session reset scenarios.
    conn_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,

    /// Every inbound byte, across all connections, in arrival order.
    received: Arc<Mutex<Vec<u8>>>,
}

impl MockSshPeer {
    /// Binds to `127.0.0.1:0` and starts the accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if binding fails.
    pub async fn spawn(config: MockPeerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let conn_tasks = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(Mutex::new(Vec::new()));

        let accept_task = tokio::spawn(accept_loop(
            listener,
            config,
            Arc::clone(&shutdown),
            Arc::clone(&conn_tasks),
            Arc::clone(&received),
        ));

        debug!(%addr, "mock SSH peer listening");

        Ok(Self {
            addr,
            shutdown,
            accept_task,
            conn_tasks,
            received,
        })
    }

    /// Returns the bound socket address.
    #[inline]
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the host string clients should connect to.
    #[inline]
    #[must_use]
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Returns a copy of every byte received so far.
    #[inline]
    #[must_use]
    pub fn received(&self) -> Vec<u8> {
        self.received.lock().clone()
    }

    /// Drops all live connections without stopping the listener.
    ///
    /// Simulates an upstream reset mid-session.
    pub fn drop_connections(&self) {
        for task in self.conn_tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Stops the accept loop and drops all connections.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.accept_task.abort();
        self.drop_connections();
    }
}

impl Drop for MockSshPeer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Accept Loop
// ============================================================================

async fn accept_loop(
    listener: TcpListener,
    config: MockPeerConfig,
    shutdown: Arc<AtomicBool>,
    conn_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    received: Arc<Mutex<Vec<u8>>>,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, addr))) => {
                debug!(?addr, "mock peer accepted connection");
                let task = tokio::spawn(serve_connection(
                    stream,
                    config.clone(),
                    Arc::clone(&received),
                ));
                conn_tasks.lock().push(task);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "mock peer accept failed");
            }
            Err(_) => continue,
        }
    }
}

// ============================================================================
// Connection Handling
// ============================================================================

/// Serves one connection per the wire contract.
async fn serve_connection(
    mut stream: TcpStream,
    config: MockPeerConfig,
    received: Arc<Mutex<Vec<u8>>>,
) {
    // Banner goes out unsolicited, before any client byte.
    let banner = Banner::new(&config.software).encode();
    if stream.write_all(banner.as_bytes()).await.is_err() {
        return;
    }

    let mut pending: Vec<u8> = Vec::new();
    let mut authed = false;
    let mut buf = vec![0u8; 4096];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };

        received.lock().extend_from_slice(&buf[..n]);
        pending.extend_from_slice(&buf[..n]);

        if !authed
            && let Some(end) = find_marker(&pending, SERVICE_USERAUTH.as_bytes())
        {
            if config.reject_auth {
                debug!("mock peer rejecting authentication");
                return;
            }
            if stream.write_all(&AUTH_ACCEPTED_WIRE).await.is_err() {
                return;
            }
            authed = true;
            pending.drain(..end);
        }

        while let Some(end) = find_marker(&pending, CHANNEL_REQUEST_EXEC.as_bytes()) {
            let reply =
                Packet::channel_data(ChannelId::main(), config.response.as_bytes().to_vec());
            if stream.write_all(&reply.encode()).await.is_err() {
                return;
            }
            pending.drain(..end);
        }

        // Bound the scan buffer; keep a tail so split markers still match.
        if pending.len() > MAX_PENDING {
            let cut = pending.len() - MARKER_TAIL;
            pending.drain(..cut);
        }
    }
}

/// Finds `needle` in `haystack`, returning the index just past the match.
fn find_marker(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|start| start + needle.len())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::wire::{MSG_CHANNEL_DATA, PacketDecoder};

    async fn read_exact(stream: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        stream.read_exact(&mut out).await.expect("read_exact");
        out
    }

    async fn read_banner_line(stream: &mut TcpStream) -> Vec<u8> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            stream.read_exact(&mut byte).await.expect("read byte");
            line.push(byte[0]);
            if byte[0] == b'\n' {
                return line;
            }
        }
    }

    #[tokio::test]
    async fn test_banner_sent_unsolicited() {
        let peer = MockSshPeer::spawn(MockPeerConfig::new()).await.expect("peer");
        let mut stream = TcpStream::connect(peer.addr()).await.expect("connect");

        let line = read_banner_line(&mut stream).await;
        assert_eq!(line, b"SSH-2.0-mockssh_1.0\r\n");
    }

    #[tokio::test]
    async fn test_userauth_then_exec_sequence() {
        // Scenario: auth trigger, then exec trigger, in separate writes.
        let peer = MockSshPeer::spawn(MockPeerConfig::new().with_response("pong\n"))
            .await
            .expect("peer");
        let mut stream = TcpStream::connect(peer.addr()).await.expect("connect");

        let _banner = read_banner_line(&mut stream).await;

        stream.write_all(b"ssh-userauth").await.expect("write");
        let ack = read_exact(&mut stream, AUTH_ACCEPTED_WIRE.len()).await;
        assert_eq!(ack, AUTH_ACCEPTED_WIRE);

        stream.write_all(b"exec").await.expect("write");

        let mut decoder = PacketDecoder::new();
        let packet = loop {
            let mut chunk = [0u8; 256];
            let n = stream.read(&mut chunk).await.expect("read");
            assert!(n > 0, "peer closed before replying");
            decoder.push(&chunk[..n]);
            if let Some(packet) = decoder.try_next().expect("decode") {
                break packet;
            }
        };

        assert_eq!(packet.msg_type, MSG_CHANNEL_DATA);
        assert_eq!(packet.recipient_channel, ChannelId::main());
        assert_eq!(packet.data, b"pong\n");
    }

    #[tokio::test]
    async fn test_marker_split_across_writes() {
        let peer = MockSshPeer::spawn(MockPeerConfig::new()).await.expect("peer");
        let mut stream = TcpStream::connect(peer.addr()).await.expect("connect");

        let _banner = read_banner_line(&mut stream).await;

        stream.write_all(b"ssh-user").await.expect("write");
        stream.write_all(b"auth").await.expect("write");

        let ack = read_exact(&mut stream, AUTH_ACCEPTED_WIRE.len()).await;
        assert_eq!(ack, AUTH_ACCEPTED_WIRE);
    }

    #[tokio::test]
    async fn test_reject_auth_drops_connection() {
        let peer = MockSshPeer::spawn(MockPeerConfig::new().with_reject_auth())
            .await
            .expect("peer");
        let mut stream = TcpStream::connect(peer.addr()).await.expect("connect");

        let _banner = read_banner_line(&mut stream).await;
        stream.write_all(b"ssh-userauth").await.expect("write");

        let mut chunk = [0u8; 16];
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        assert_eq!(n, 0, "peer must drop the connection on rejection");
    }

    #[tokio::test]
    async fn test_records_inbound_bytes() {
        let peer = MockSshPeer::spawn(MockPeerConfig::new()).await.expect("peer");
        let mut stream = TcpStream::connect(peer.addr()).await.expect("connect");

        let _banner = read_banner_line(&mut stream).await;
        stream.write_all(b"arbitrary bytes \x01\x02").await.expect("write");
        stream.flush().await.expect("flush");

        // Reads land asynchronously; poll briefly.
        for _ in 0..50 {
            if !peer.received().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(peer.received(), b"arbitrary bytes \x01\x02");
    }

    #[test]
    fn test_find_marker() {
        assert_eq!(find_marker(b"..exec..", b"exec"), Some(6));
        assert_eq!(find_marker(b"exe", b"exec"), None);
        assert_eq!(find_marker(b"", b"exec"), None);
    }
}
