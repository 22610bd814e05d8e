//! WebSocket bridge server.
//!
//! Binds the listener, validates the `/ws/servers/{serverId}/ssh/` path during
//! the WebSocket upgrade, and spawns one session task per accepted
//! connection.
//!
//! # Connection Flow
//!
//! 1. Client opens a WebSocket to `/ws/servers/{serverId}/ssh/`
//! 2. The upgrade callback extracts the server id (non-matching paths are
//!    rejected with 404 during the handshake)
//! 3. A session is registered and its task spawned
//! 4. The session brokers the upstream SSH connection until either side
//!    closes

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ServerId, SessionId};
use crate::upstream::SshConnector;

use super::options::RelayOptions;
use super::registry::{SessionHandle, SessionRegistry};
use super::session;

// ============================================================================
// Constants
// ============================================================================

/// Accept-poll interval so the loop can observe the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Endpoint pattern; one WebSocket per terminal session.
static PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/ws/servers/(\d+)/ssh/?$").expect("valid path regex"));

// ============================================================================
// BridgeServer
// ============================================================================

/// The relay's WebSocket server.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use termbridge::relay::{BridgeServer, RelayOptions};
/// use termbridge::upstream::FramedConnector;
///
/// let connector = Arc::new(FramedConnector::new());
/// let server = BridgeServer::bind(connector, RelayOptions::new()).await?;
/// println!("endpoint: {}", server.ws_url(ServerId::new(1)));
/// ```
pub struct BridgeServer {
    /// IP the listener is bound to.
    bind_ip: IpAddr,

    /// Port the listener is bound to.
    port: u16,

    /// Upstream connector shared by all sessions.
    connector: Arc<dyn SshConnector>,

    /// Live sessions, for listing and cleanup only.
    registry: Arc<SessionRegistry>,

    /// Shutdown flag for the accept loop.
    shutdown: AtomicBool,
}

// ============================================================================
// BridgeServer - Constructor
// ============================================================================

impl BridgeServer {
    /// Binds the listener and starts the accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(
        connector: Arc<dyn SshConnector>,
        options: RelayOptions,
    ) -> Result<Arc<Self>> {
        let addr = SocketAddr::new(options.bind_ip, options.port);
        let listener = TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        let server = Arc::new(Self {
            bind_ip: options.bind_ip,
            port: actual_port,
            connector,
            registry: Arc::new(SessionRegistry::new()),
            shutdown: AtomicBool::new(false),
        });

        let accept_server = Arc::clone(&server);
        tokio::spawn(async move {
            accept_server.accept_loop(listener).await;
        });

        info!(port = actual_port, "bridge server started");

        Ok(server)
    }
}

// ============================================================================
// BridgeServer - Public API
// ============================================================================

impl BridgeServer {
    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the WebSocket URL for a server id.
    ///
    /// Format: `ws://{bind_ip}:{port}/ws/servers/{serverId}/ssh/`
    #[inline]
    #[must_use]
    pub fn ws_url(&self, server_id: ServerId) -> String {
        format!(
            "ws://{}:{}/ws/servers/{}/ssh/",
            self.bind_ip, self.port, server_id
        )
    }

    /// Returns the session registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Stops the accept loop and tears down all live sessions.
    pub fn shutdown(&self) {
        info!("bridge server shutting down");
        self.shutdown.store(true, Ordering::SeqCst);
        self.registry.shutdown_all();
    }
}

// ============================================================================
// BridgeServer - Accept Loop
// ============================================================================

impl BridgeServer {
    /// Background task accepting new WebSocket connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("accept loop started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                debug!("accept loop shutting down");
                break;
            }

            match timeout(ACCEPT_POLL, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, addr).await {
                            warn!(error = %e, ?addr, "connection handling failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "accept failed");
                }
                Err(_) => continue,
            }
        }

        debug!("accept loop terminated");
    }

    /// Upgrades one TCP connection and spawns its session.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(?addr, "new TCP connection");

        let mut server_id: Option<ServerId> = None;
        let ws_stream = tokio_tungstenite::accept_hdr_async(stream, |request: &Request, response: Response| {
            match parse_path(request.uri().path()) {
                Some(id) => {
                    server_id = Some(id);
                    Ok(response)
                }
                None => {
                    debug!(path = request.uri().path(), "rejecting non-endpoint path");
                    let mut rejection = ErrorResponse::new(None);
                    *rejection.status_mut() = StatusCode::NOT_FOUND;
                    Err(rejection)
                }
            }
        })
        .await
        .map_err(|e| Error::transport(format!("WebSocket upgrade failed: {e}")))?;

        let server_id = server_id
            .ok_or_else(|| Error::transport("upgrade completed without a server id"))?;
        let session_id = SessionId::generate();

        info!(session_id = %session_id, server_id = %server_id, ?addr, "WebSocket connection established");

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel = Arc::new(cancel_tx);
        self.registry
            .insert(session_id, SessionHandle::new(server_id, cancel));

        tokio::spawn(session::run(
            ws_stream,
            session_id,
            server_id,
            Arc::clone(&self.connector),
            Arc::clone(&self.registry),
            cancel_rx,
        ));

        Ok(())
    }
}

// ============================================================================
// Path Parsing
// ============================================================================

/// Extracts the server id from an endpoint path.
fn parse_path(path: &str) -> Option<ServerId> {
    let captures = PATH_RE.captures(path)?;
    captures[1].parse::<u64>().ok().map(ServerId::new)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::upstream::FramedConnector;

    #[test]
    fn test_parse_path() {
        assert_eq!(parse_path("/ws/servers/1/ssh/"), Some(ServerId::new(1)));
        assert_eq!(parse_path("/ws/servers/42/ssh"), Some(ServerId::new(42)));
        assert_eq!(parse_path("/ws/servers/abc/ssh/"), None);
        assert_eq!(parse_path("/ws/servers/1/sftp/"), None);
        assert_eq!(parse_path("/"), None);
        assert_eq!(parse_path("/ws/servers//ssh/"), None);
    }

    #[tokio::test]
    async fn test_bind_random_port() {
        let connector = Arc::new(FramedConnector::new());
        let server = BridgeServer::bind(connector, RelayOptions::new())
            .await
            .expect("bind");

        assert!(server.port() > 0);
        assert_eq!(
            server.ws_url(ServerId::new(7)),
            format!("ws://127.0.0.1:{}/ws/servers/7/ssh/", server.port())
        );
        assert_eq!(server.registry().count(), 0);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_bad_path_rejected_during_upgrade() {
        let connector = Arc::new(FramedConnector::new());
        let server = BridgeServer::bind(connector, RelayOptions::new())
            .await
            .expect("bind");

        let url = format!("ws://127.0.0.1:{}/definitely/not/ssh/", server.port());
        let result = tokio_tungstenite::connect_async(url.as_str()).await;
        assert!(result.is_err(), "non-endpoint path must fail the upgrade");

        server.shutdown();
    }

    #[tokio::test]
    async fn test_session_registered_on_connect() {
        let connector = Arc::new(FramedConnector::new());
        let server = BridgeServer::bind(connector, RelayOptions::new())
            .await
            .expect("bind");

        let url = server.ws_url(ServerId::new(1));
        let (_ws, _resp) = tokio_tungstenite::connect_async(url.as_str()).await.expect("upgrade");

        // Registration happens right after the upgrade; poll briefly.
        for _ in 0..50 {
            if server.registry().count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(server.registry().count(), 1);

        server.shutdown();
    }
}
