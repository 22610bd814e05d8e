//! Async session controller.
//!
//! Drives a [`SessionMachine`](super::machine::SessionMachine) over a real
//! WebSocket: user commands and socket events are serialized onto one select
//! loop, transitions run synchronously, and the resulting actions are
//! executed here: opening sockets, sending frames, and arming a cancellable
//! retry timer.
//!
//! The embedding terminal UI holds a [`SessionController`] handle and
//! consumes [`TerminalEvent`]s; it never touches the socket or the machine
//! directly.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{ConnectionRequest, ServerMessage};

use super::machine::{Action, SessionMachine, SessionState, SocketEvent};
use super::options::ControllerOptions;

// ============================================================================
// Types
// ============================================================================

/// Client-side WebSocket stream.
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// TerminalEvent
// ============================================================================

/// Events the controller surfaces to the embedding terminal UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// The lifecycle state changed.
    StateChanged(SessionState),

    /// Output bytes to append to the terminal buffer.
    Output(String),

    /// An informational notice (connect/disconnect).
    Notice(String),

    /// Error text, rendered with distinct styling.
    Error(String),
}

// ============================================================================
// UserCommand
// ============================================================================

/// User actions, serialized onto the controller loop.
#[derive(Debug)]
enum UserCommand {
    Connect(ConnectionRequest),
    Command(String),
    Disconnect,
}

// ============================================================================
// SessionController
// ============================================================================

/// Handle to a running session controller.
///
/// Dropping the handle disconnects cleanly and stops the driver task.
///
/// # Example
///
/// ```ignore
/// let mut controller = SessionController::spawn(options);
/// controller.connect(request)?;
/// while let Some(event) = controller.next_event().await {
///     match event {
///         TerminalEvent::Output(data) => terminal.append(&data),
///         ...
///     }
/// }
/// ```
#[derive(Debug)]
pub struct SessionController {
    commands: mpsc::UnboundedSender<UserCommand>,
    events: mpsc::UnboundedReceiver<TerminalEvent>,
}

impl SessionController {
    /// Spawns the driver task for one session endpoint.
    #[must_use]
    pub fn spawn(options: ControllerOptions) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(drive(options, command_rx, event_tx));

        Self {
            commands: command_tx,
            events: event_rx,
        }
    }

    /// Requests a connection with the given parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the driver task has exited.
    pub fn connect(&self, request: ConnectionRequest) -> Result<()> {
        self.commands
            .send(UserCommand::Connect(request))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Sends command bytes to the remote shell.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the driver task has exited.
    pub fn send_command(&self, command: impl Into<String>) -> Result<()> {
        self.commands
            .send(UserCommand::Command(command.into()))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Disconnects proactively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the driver task has exited.
    pub fn disconnect(&self) -> Result<()> {
        self.commands
            .send(UserCommand::Disconnect)
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Receives the next terminal event.
    ///
    /// Returns `None` once the driver task has exited.
    pub async fn next_event(&mut self) -> Option<TerminalEvent> {
        self.events.recv().await
    }
}

// ============================================================================
// Driver Loop
// ============================================================================

/// The controller's single event loop.
///
/// All socket callbacks, the retry timer, and user actions funnel through
/// this one select, so session state is never mutated concurrently.
async fn drive(
    options: ControllerOptions,
    mut commands: mpsc::UnboundedReceiver<UserCommand>,
    events: mpsc::UnboundedSender<TerminalEvent>,
) {
    let mut machine = SessionMachine::new(options.max_retries, options.retry_delay);
    let mut socket: Option<WsClient> = None;
    let mut retry_at: Option<Instant> = None;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(UserCommand::Connect(request)) => {
                    let actions = machine.connect(request);
                    dispatch(actions, &mut machine, &mut socket, &mut retry_at, &events, &options).await;
                }
                Some(UserCommand::Command(command)) => {
                    let actions = machine.command(command);
                    dispatch(actions, &mut machine, &mut socket, &mut retry_at, &events, &options).await;
                }
                Some(UserCommand::Disconnect) => {
                    let actions = machine.disconnect();
                    dispatch(actions, &mut machine, &mut socket, &mut retry_at, &events, &options).await;
                }
                None => {
                    // Handle dropped: close cleanly and stop.
                    debug!("controller handle dropped, stopping driver");
                    if let Some(mut ws) = socket.take() {
                        let _ = ws.close(None).await;
                    }
                    break;
                }
            },

            msg = next_socket_msg(&mut socket), if socket.is_some() => {
                let event = match msg {
                    Some(Ok(Message::Text(text))) => match ServerMessage::parse(text.as_str()) {
                        Ok(Some(parsed)) => Some(SocketEvent::Message(parsed)),
                        Ok(None) => {
                            trace!("ignoring unknown server message type");
                            None
                        }
                        // Never fatal on the client; skip and keep reading.
                        Err(e) => {
                            warn!(error = %e, "ignoring unparseable server frame");
                            None
                        }
                    },

                    Some(Ok(Message::Close(_))) | None => {
                        socket = None;
                        Some(SocketEvent::Closed)
                    }

                    Some(Ok(_)) => None,

                    Some(Err(e)) => {
                        debug!(error = %e, "socket error");
                        socket = None;
                        Some(SocketEvent::Error)
                    }
                };

                if let Some(event) = event {
                    let actions = machine.handle(event);
                    dispatch(actions, &mut machine, &mut socket, &mut retry_at, &events, &options).await;
                }
            },

            _ = wait_retry(&retry_at), if retry_at.is_some() => {
                retry_at = None;
                let actions = machine.retry_elapsed();
                dispatch(actions, &mut machine, &mut socket, &mut retry_at, &events, &options).await;
            },
        }
    }
}

/// Awaits the next socket message, or parks forever without a socket.
async fn next_socket_msg(
    socket: &mut Option<WsClient>,
) -> Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match socket {
        Some(ws) => ws.next().await,
        None => std::future::pending().await,
    }
}

/// Sleeps until the retry deadline, or parks forever without one.
///
/// Recreated on every loop turn, so clearing `retry_at` cancels the timer.
async fn wait_retry(retry_at: &Option<Instant>) {
    match retry_at {
        Some(deadline) => tokio::time::sleep_until(*deadline).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Action Execution
// ============================================================================

/// Executes a transition's actions, feeding follow-up socket events back into
/// the machine, then reports any state change.
async fn dispatch(
    actions: Vec<Action>,
    machine: &mut SessionMachine,
    socket: &mut Option<WsClient>,
    retry_at: &mut Option<Instant>,
    events: &mpsc::UnboundedSender<TerminalEvent>,
    options: &ControllerOptions,
) {
    let before = machine.state();
    let mut queue: VecDeque<Action> = actions.into();

    while let Some(action) = queue.pop_front() {
        match action {
            Action::OpenSocket => {
                match connect_async(options.endpoint.as_str()).await {
                    Ok((ws, _response)) => {
                        debug!(endpoint = %options.endpoint, "socket opened");
                        *socket = Some(ws);
                        queue.extend(machine.handle(SocketEvent::Opened));
                    }
                    Err(e) => {
                        debug!(endpoint = %options.endpoint, error = %e, "socket open failed");
                        *socket = None;
                        queue.extend(machine.handle(SocketEvent::Error));
                    }
                }
            }

            Action::SendFrame(msg) => {
                let sent = match (socket.as_mut(), msg.to_json()) {
                    (Some(ws), Ok(json)) => ws.send(Message::Text(json.into())).await.is_ok(),
                    _ => false,
                };
                if !sent {
                    warn!("frame send failed");
                    *socket = None;
                    queue.extend(machine.handle(SocketEvent::Error));
                }
            }

            Action::AppendOutput(data) => {
                let _ = events.send(TerminalEvent::Output(data));
            }

            Action::ShowNotice(text) => {
                let _ = events.send(TerminalEvent::Notice(text));
            }

            Action::ShowError(text) => {
                let _ = events.send(TerminalEvent::Error(text));
            }

            Action::ScheduleRetry(delay) => {
                *retry_at = Some(Instant::now() + delay);
            }

            Action::CancelRetry => {
                *retry_at = None;
            }

            Action::CloseSocket => {
                if let Some(mut ws) = socket.take() {
                    let _ = ws.close(None).await;
                }
            }
        }
    }

    let after = machine.state();
    if before != after {
        let _ = events.send(TerminalEvent::StateChanged(after));
    }
}
