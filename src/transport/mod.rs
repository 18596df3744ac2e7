//! Transport abstraction between the hub and the socket layer.
//!
//! The registry owns exactly one transport per connection and is the only
//! component allowed to write to it. The WebSocket handler adapts a live
//! socket to this trait via [`ChannelTransport`]; tests drive the hub with
//! the same type over a plain mpsc channel.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
}

/// Outbound half of a client connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one text frame. May suspend on backpressure; failure means the
    /// peer is unreachable and is treated by callers as a dead connection.
    async fn send_text(&self, frame: String) -> Result<(), TransportError>;
}

/// Transport backed by an mpsc channel, drained by a per-connection send
/// task that pumps frames into the actual socket.
pub struct ChannelTransport {
    tx: mpsc::Sender<String>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send_text(&self, frame: String) -> Result<(), TransportError> {
        self.tx.send(frame).await.map_err(|_| TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn delivers_frames_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let transport = ChannelTransport::new(tx);
        tokio_test::assert_ok!(transport.send_text("one".into()).await);
        tokio_test::assert_ok!(transport.send_text("two".into()).await);
        assert_eq!(rx.recv().await.unwrap(), "one");
        assert_eq!(rx.recv().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let transport = ChannelTransport::new(tx);
        assert!(transport.send_text("lost".into()).await.is_err());
    }
}
