//! Session controller configuration.
//!
//! # Example
//!
//! ```ignore
//! use termbridge::client::ControllerOptions;
//!
//! let options = ControllerOptions::new("ws://127.0.0.1:8022/ws/servers/1/ssh/")?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

use super::machine::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};

// ============================================================================
// ControllerOptions
// ============================================================================

/// Session controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// WebSocket endpoint of the bridge session.
    pub endpoint: Url,

    /// Cap on connection attempts before giving up.
    pub max_retries: u32,

    /// Fixed delay between reconnect attempts.
    pub retry_delay: Duration,
}

impl ControllerOptions {
    /// Creates options for an endpoint URL with the default retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL does not parse or is not a
    /// `ws`/`wss` URL.
    pub fn new(endpoint: impl AsRef<str>) -> Result<Self> {
        let endpoint = Url::parse(endpoint.as_ref())
            .map_err(|e| Error::config(format!("invalid endpoint URL: {e}")))?;

        match endpoint.scheme() {
            "ws" | "wss" => {}
            scheme => {
                return Err(Error::config(format!(
                    "endpoint must be a ws:// or wss:// URL, got {scheme}://"
                )));
            }
        }

        Ok(Self {
            endpoint,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Sets the attempt cap.
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the fixed reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
