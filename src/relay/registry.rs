//! Session registry.
//!
//! Maps live session IDs to their handles, used only for listing and
//! cleanup. The registry is never on the byte-pump hot path: sessions
//! register on accept, deregister on teardown, and otherwise share no
//! mutable state with one another.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::watch;
use tracing::debug;

use crate::identifiers::{ServerId, SessionId};

// ============================================================================
// SessionHandle
// ============================================================================

/// Registry entry for one live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Server the session was opened against.
    pub server_id: ServerId,

    /// When the WebSocket was accepted.
    pub created_at: Instant,

    /// Trips the session's cancellation signal.
    cancel: Arc<watch::Sender<bool>>,
}

impl SessionHandle {
    /// Creates a handle around a session's cancellation signal.
    #[inline]
    #[must_use]
    pub fn new(server_id: ServerId, cancel: Arc<watch::Sender<bool>>) -> Self {
        Self {
            server_id,
            created_at: Instant::now(),
            cancel,
        }
    }

    /// Requests session teardown.
    ///
    /// Idempotent; the session closes both its transports exactly once.
    #[inline]
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }
}

// ============================================================================
// SessionRegistry
// ============================================================================

/// Thread-safe map of live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<FxHashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session.
    pub fn insert(&self, session_id: SessionId, handle: SessionHandle) {
        self.sessions.write().insert(session_id, handle);
        debug!(session_id = %session_id, "session registered");
    }

    /// Deregisters a session, returning its handle if it was present.
    pub fn remove(&self, session_id: SessionId) -> Option<SessionHandle> {
        let removed = self.sessions.write().remove(&session_id);
        if removed.is_some() {
            debug!(session_id = %session_id, "session deregistered");
        }
        removed
    }

    /// Returns the number of live sessions.
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns the IDs of all live sessions.
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().copied().collect()
    }

    /// Trips every session's cancellation signal and clears the map.
    ///
    /// Sessions finish their own teardown; a session that already
    /// deregistered is simply gone.
    pub fn shutdown_all(&self) {
        let drained: Vec<_> = {
            let mut sessions = self.sessions.write();
            sessions.drain().collect()
        };

        for (session_id, handle) in drained {
            handle.cancel();
            debug!(session_id = %session_id, "session cancelled during shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (SessionHandle, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (SessionHandle::new(ServerId::new(1), Arc::new(tx)), rx)
    }

    #[test]
    fn test_insert_remove() {
        let registry = SessionRegistry::new();
        let session_id = SessionId::generate();
        let (h, _rx) = handle();

        registry.insert(session_id, h);
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.ids(), vec![session_id]);

        assert!(registry.remove(session_id).is_some());
        assert_eq!(registry.count(), 0);
        assert!(registry.remove(session_id).is_none());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (h, rx) = handle();
        h.cancel();
        h.cancel();
        assert!(*rx.borrow());
    }

    #[test]
    fn test_shutdown_all_cancels_every_session() {
        let registry = SessionRegistry::new();
        let (h1, rx1) = handle();
        let (h2, rx2) = handle();

        registry.insert(SessionId::generate(), h1);
        registry.insert(SessionId::generate(), h2);

        registry.shutdown_all();
        assert_eq!(registry.count(), 0);
        assert!(*rx1.borrow());
        assert!(*rx2.borrow());
    }
}
