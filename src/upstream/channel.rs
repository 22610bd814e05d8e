//! Byte channel between a session and its upstream SSH transport.
//!
//! An [`SshChannel`] is the session-facing half of one upstream connection:
//! writes go out verbatim, reads yield output chunks in production order. The
//! connector-facing half is a [`ChannelDriver`], which the transport
//! implementation pumps.
//!
//! The output path is a **bounded** queue: when the consumer (the WebSocket
//! writer) is slow, the transport pump blocks on
//! [`ChannelDriver::output`] and stops reading from the upstream socket, so
//! memory stays bounded and TCP backpressure propagates to the remote host.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default bound on queued output chunks before the upstream pump pauses.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 32;

// ============================================================================
// Types
// ============================================================================

/// One upstream output chunk, or the error that ended the stream.
pub type OutputChunk = Result<Vec<u8>>;

// ============================================================================
// SshChannel
// ============================================================================

/// Session-facing handle to one upstream SSH connection.
///
/// Created by an [`SshConnector`](super::SshConnector) after a successful
/// handshake. Dropping the handle (or calling [`close`](Self::close)) cancels
/// both transport pumps.
#[derive(Debug)]
pub struct SshChannel {
    /// Outgoing bytes, written verbatim to the upstream input stream.
    input: mpsc::UnboundedSender<Vec<u8>>,

    /// Incoming output chunks, in production order.
    output: mpsc::Receiver<OutputChunk>,

    /// Cancellation signal shared with the transport pumps.
    cancel: Arc<watch::Sender<bool>>,
}

impl SshChannel {
    /// Creates a channel and its transport-facing driver.
    ///
    /// `output_capacity` bounds the number of queued output chunks; it is the
    /// backpressure threshold described in the concurrency model.
    #[must_use]
    pub fn pair(output_capacity: usize) -> (Self, ChannelDriver) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::channel(output_capacity.max(1));
        let (cancel_tx, _) = watch::channel(false);
        let cancel = Arc::new(cancel_tx);

        let channel = Self {
            input: input_tx,
            output: output_rx,
            cancel: Arc::clone(&cancel),
        };
        let driver = ChannelDriver {
            input: input_rx,
            output: output_tx,
            cancel,
        };

        (channel, driver)
    }

    /// Writes bytes to the upstream input stream, unmodified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the transport pump is gone.
    pub fn write(&self, bytes: Vec<u8>) -> Result<()> {
        self.input
            .send(bytes)
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Receives the next output chunk.
    ///
    /// Returns `None` when the upstream closed cleanly; `Some(Err(_))` carries
    /// the transport or protocol error that ended the stream.
    pub async fn read(&mut self) -> Option<OutputChunk> {
        self.output.recv().await
    }

    /// Cancels both transport pumps.
    ///
    /// Idempotent; also invoked on drop.
    pub fn close(&self) {
        self.cancel.send_replace(true);
    }
}

impl Drop for SshChannel {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// ChannelDriver
// ============================================================================

/// Transport-facing half of an [`SshChannel`].
///
/// A connector implementation moves this into its pump tasks: bytes received
/// on [`input`](Self::input) go to the upstream socket, decoded output goes
/// into [`output`](Self::output), and [`cancel`](Self::cancel) coordinates
/// teardown of both legs.
#[derive(Debug)]
pub struct ChannelDriver {
    /// Bytes from the session, to be written upstream verbatim.
    pub input: mpsc::UnboundedReceiver<Vec<u8>>,

    /// Decoded upstream output chunks; bounded, blocks when the consumer is
    /// slow.
    pub output: mpsc::Sender<OutputChunk>,

    /// Shared cancellation signal. Either pump leg may trip it; both watch it.
    pub cancel: Arc<watch::Sender<bool>>,
}

impl ChannelDriver {
    /// Subscribes to the cancellation signal.
    #[inline]
    #[must_use]
    pub fn cancelled(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    /// Trips the cancellation signal for both pump legs.
    #[inline]
    pub fn cancel_all(&self) {
        self.cancel.send_replace(true);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_reaches_driver() {
        let (channel, mut driver) = SshChannel::pair(4);

        channel.write(b"ls\n".to_vec()).expect("write");
        let bytes = driver.input.recv().await.expect("driver receives");
        assert_eq!(bytes, b"ls\n");
    }

    #[tokio::test]
    async fn test_output_order_preserved() {
        let (mut channel, driver) = SshChannel::pair(4);

        driver.output.send(Ok(b"one".to_vec())).await.expect("send");
        driver.output.send(Ok(b"two".to_vec())).await.expect("send");
        drop(driver);

        assert_eq!(channel.read().await.expect("chunk").expect("ok"), b"one");
        assert_eq!(channel.read().await.expect("chunk").expect("ok"), b"two");
        assert!(channel.read().await.is_none());
    }

    #[tokio::test]
    async fn test_bounded_output_applies_backpressure() {
        let (_channel, driver) = SshChannel::pair(1);

        driver.output.send(Ok(vec![1])).await.expect("first fits");
        // Queue is full; a second send must not complete until drained.
        let err = driver.output.try_send(Ok(vec![2]));
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_close_signals_driver() {
        let (channel, driver) = SshChannel::pair(4);
        let mut cancelled = driver.cancelled();

        assert!(!*cancelled.borrow());
        channel.close();
        cancelled.changed().await.expect("signal");
        assert!(*cancelled.borrow());

        // Idempotent.
        channel.close();
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let (channel, driver) = SshChannel::pair(4);
        let mut cancelled = driver.cancelled();

        drop(channel);
        cancelled.changed().await.expect("signal");
        assert!(*cancelled.borrow());
    }

    #[tokio::test]
    async fn test_write_after_driver_gone() {
        let (channel, driver) = SshChannel::pair(4);
        drop(driver);

        let err = channel.write(b"x".to_vec()).unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }
}
