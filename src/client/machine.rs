//! Session controller state machine.
//!
//! A pure, synchronous transition function over socket events and user
//! commands. Every transition returns the [`Action`]s the driver must
//! perform, so the whole lifecycle, retry policy included, is unit
//! testable without sockets or timers.
//!
//! # States
//!
//! ```text
//!                    connect()
//!   disconnected ───────────────► connecting ──── recv connected ───► connected
//!        ▲                          │    ▲                               │
//!        │                          │    └── retry (count < max) ◄───────┤
//!        │   recv disconnected /    │                                    │
//!        └── socket close ◄─────────┴──── socket error (count == max) ─► error
//! ```
//!
//! The `connect` frame is sent only on the socket's open event, never
//! before: queuing sends on a not-yet-open socket drops the first frame on
//! some hosts. The backoff is a fixed delay with a hard attempt cap; the
//! count resets only on a `connected` acknowledgment or a fresh user
//! `connect()`.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::protocol::{ClientMessage, ConnectionRequest, ServerMessage};

// ============================================================================
// Constants
// ============================================================================

/// Default cap on connection attempts before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default fixed delay between reconnect attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2000);

/// Notice shown when the session ends, shown at most once per session.
pub const DISCONNECT_NOTICE: &str = "Disconnected from server";

/// Terminal message once the attempt cap is reached.
pub const MAX_RETRIES_NOTICE: &str = "Max retries reached";

// ============================================================================
// SessionState
// ============================================================================

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No socket; idle until the user connects.
    Disconnected,

    /// Socket opening, `connect` sent, or a retry pending.
    Connecting,

    /// Upstream acknowledged; terminal traffic flows.
    Connected,

    /// Attempt cap reached; only a fresh user `connect()` leaves this state.
    Error,
}

// ============================================================================
// SocketEvent
// ============================================================================

/// Socket-side events, serialized onto the controller's single queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The socket finished opening.
    Opened,

    /// A parsed server message arrived.
    Message(ServerMessage),

    /// The socket failed (refused, reset, or send failure).
    Error,

    /// The socket closed.
    Closed,
}

// ============================================================================
// Action
// ============================================================================

/// Side effects the driver performs for a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open a WebSocket to the configured endpoint.
    OpenSocket,

    /// Send a frame on the open socket.
    SendFrame(ClientMessage),

    /// Append bytes to the terminal buffer.
    AppendOutput(String),

    /// Show an informational notice.
    ShowNotice(String),

    /// Show error text with distinct styling.
    ShowError(String),

    /// Schedule a cancellable reconnect timer.
    ScheduleRetry(Duration),

    /// Cancel any pending reconnect timer.
    CancelRetry,

    /// Close the socket proactively.
    CloseSocket,
}

// ============================================================================
// SessionMachine
// ============================================================================

/// The client-side connection lifecycle machine.
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    retry_count: u32,
    max_retries: u32,
    retry_delay: Duration,

    /// Connection parameters, replayed on every (re)open.
    request: Option<ConnectionRequest>,

    /// A reconnect timer is outstanding; suppresses the close-notice for the
    /// socket that already failed.
    retry_pending: bool,

    /// The socket is open (an `Opened` arrived with no close/error since).
    socket_open: bool,

    /// The disconnect notice was shown for this session.
    notified: bool,
}

impl SessionMachine {
    /// Creates a machine with the given retry policy.
    #[must_use]
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            state: SessionState::Disconnected,
            retry_count: 0,
            max_retries,
            retry_delay,
            request: None,
            retry_pending: false,
            socket_open: false,
            notified: false,
        }
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current retry count; resets to 0 on a `connected` acknowledgment.
    #[inline]
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }
}

// ============================================================================
// SessionMachine - User Commands
// ============================================================================

impl SessionMachine {
    /// User asked to connect.
    ///
    /// Valid from `disconnected` and from terminal `error` (a manual connect
    /// is the only way out of it). While still `connecting` on an open
    /// socket (the upstream rejected credentials but the session survived),
    /// the new request goes out over the same socket, no reopen. Ignored once
    /// connected.
    pub fn connect(&mut self, request: ConnectionRequest) -> Vec<Action> {
        match self.state {
            SessionState::Disconnected | SessionState::Error => {
                self.request = Some(request);
                self.retry_count = 0;
                self.retry_pending = false;
                self.notified = false;
                self.state = SessionState::Connecting;
                vec![Action::OpenSocket]
            }
            SessionState::Connecting => {
                self.request = Some(request.clone());
                if self.socket_open {
                    vec![Action::SendFrame(ClientMessage::Connect { request })]
                } else {
                    // Socket still opening or a retry pending; the stored
                    // request rides on the next open event.
                    Vec::new()
                }
            }
            SessionState::Connected => Vec::new(),
        }
    }

    /// User typed command bytes; forwarded only while connected.
    pub fn command(&mut self, command: impl Into<String>) -> Vec<Action> {
        if self.state == SessionState::Connected {
            vec![Action::SendFrame(ClientMessage::Command {
                command: command.into(),
            })]
        } else {
            Vec::new()
        }
    }

    /// User asked to disconnect; clean close, nothing surfaced.
    pub fn disconnect(&mut self) -> Vec<Action> {
        if self.state == SessionState::Disconnected {
            return Vec::new();
        }
        self.state = SessionState::Disconnected;
        self.retry_pending = false;
        self.socket_open = false;
        self.notified = true;
        self.request = None;
        vec![Action::CancelRetry, Action::CloseSocket]
    }

    /// The reconnect timer fired.
    pub fn retry_elapsed(&mut self) -> Vec<Action> {
        if self.retry_pending {
            self.retry_pending = false;
            vec![Action::OpenSocket]
        } else {
            Vec::new()
        }
    }
}

// ============================================================================
// SessionMachine - Socket Events
// ============================================================================

impl SessionMachine {
    /// Applies one socket event.
    pub fn handle(&mut self, event: SocketEvent) -> Vec<Action> {
        match event {
            SocketEvent::Opened => self.on_opened(),
            SocketEvent::Message(msg) => self.on_message(msg),
            SocketEvent::Error => self.on_socket_error(),
            SocketEvent::Closed => self.on_closed(),
        }
    }

    /// Socket opened: now, and only now, send the `connect` frame.
    fn on_opened(&mut self) -> Vec<Action> {
        self.socket_open = true;
        if self.state == SessionState::Connecting
            && let Some(request) = self.request.clone()
        {
            vec![Action::SendFrame(ClientMessage::Connect { request })]
        } else {
            Vec::new()
        }
    }

    fn on_message(&mut self, msg: ServerMessage) -> Vec<Action> {
        match msg {
            ServerMessage::Connected => {
                if self.state == SessionState::Connecting {
                    self.state = SessionState::Connected;
                    self.retry_count = 0;
                }
                Vec::new()
            }

            ServerMessage::Output { data } => {
                if self.state == SessionState::Connected {
                    vec![Action::AppendOutput(data)]
                } else {
                    Vec::new()
                }
            }

            // Inline display, no state change: auth failures arrive here
            // while still connecting, runtime errors while connected.
            ServerMessage::Error { message, data } => {
                let text = message
                    .or(data)
                    .unwrap_or_else(|| "unknown error".to_string());
                vec![Action::ShowError(text)]
            }

            ServerMessage::Disconnected => self.on_disconnect_signal(),
        }
    }

    /// Socket failure: retry with a fixed delay until the attempt cap.
    fn on_socket_error(&mut self) -> Vec<Action> {
        self.socket_open = false;
        match self.state {
            SessionState::Connecting | SessionState::Connected => {
                self.retry_count += 1;
                if self.retry_count < self.max_retries {
                    self.retry_pending = true;
                    self.state = SessionState::Connecting;
                    vec![Action::ScheduleRetry(self.retry_delay)]
                } else {
                    self.retry_pending = false;
                    self.state = SessionState::Error;
                    vec![Action::ShowError(MAX_RETRIES_NOTICE.to_string())]
                }
            }
            SessionState::Disconnected | SessionState::Error => Vec::new(),
        }
    }

    /// Socket closed.
    ///
    /// A close trailing an already-handled failure (retry pending or
    /// terminal error) is the same dead socket reporting twice; ignored.
    fn on_closed(&mut self) -> Vec<Action> {
        self.socket_open = false;
        if self.retry_pending || self.state == SessionState::Error {
            return Vec::new();
        }
        self.on_disconnect_signal()
    }

    /// A `disconnected` message or socket close; notice shown exactly once
    /// even when both signals arrive.
    fn on_disconnect_signal(&mut self) -> Vec<Action> {
        self.state = SessionState::Disconnected;
        self.retry_pending = false;
        self.socket_open = false;

        if self.notified {
            Vec::new()
        } else {
            self.notified = true;
            vec![Action::ShowNotice(DISCONNECT_NOTICE.to_string())]
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
