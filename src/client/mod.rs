//! Bridge client: the browser-side session controller.
//!
//! The controller owns the WebSocket lifecycle for one terminal session:
//! connect, message dispatch, and the retry/backoff policy. It exposes a
//! stream of [`TerminalEvent`]s to the embedding terminal UI.
//!
//! The lifecycle logic lives in a pure state machine
//! ([`SessionMachine`]) whose transitions return explicit [`Action`]s; the
//! async driver ([`SessionController`]) merely executes them. This keeps the
//! retry law and the exactly-once disconnect notice deterministic and unit
//! testable without sockets.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `machine` | Pure lifecycle state machine |
//! | `controller` | Async driver over a real WebSocket |
//! | `options` | Endpoint and retry configuration |

// ============================================================================
// Submodules
// ============================================================================

/// Async driver.
pub mod controller;

/// Pure lifecycle state machine.
pub mod machine;

/// Endpoint and retry configuration.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use controller::{SessionController, TerminalEvent};
pub use machine::{
    Action, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, SessionMachine, SessionState, SocketEvent,
};
pub use options::ControllerOptions;
