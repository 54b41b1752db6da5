//! Frame transport seam
//!
//! The engine exchanges text frames with its peer through a [`Transport`].
//! [`ChannelTransport`] connects two in-process peers; the WebSocket client
//! lives in [`crate::websocket`].

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::OcppError;

/// Channel capacity for the in-process transport
const CHANNEL_CAPACITY: usize = 64;

/// Bidirectional text-frame connection to the peer
#[async_trait]
pub trait Transport: Send + Sync {
    /// Wait for the next frame. Fails once the connection is gone.
    async fn recv(&self) -> Result<String, OcppError>;

    /// Hand a frame to the connection
    async fn send(&self, frame: String) -> Result<(), OcppError>;
}

/// In-process transport over tokio channels
pub struct ChannelTransport {
    tx: mpsc::Sender<String>,
    rx: Mutex<mpsc::Receiver<String>>,
}

impl ChannelTransport {
    /// Create a connected pair: frames sent on one end arrive on the other
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx_b, rx_b) = mpsc::channel(CHANNEL_CAPACITY);

        (
            Self {
                tx: tx_b,
                rx: Mutex::new(rx_a),
            },
            Self {
                tx: tx_a,
                rx: Mutex::new(rx_b),
            },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn recv(&self) -> Result<String, OcppError> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(OcppError::ConnectionClosed)
    }

    async fn send(&self, frame: String) -> Result<(), OcppError> {
        debug!("Channel send: {}", frame);
        self.tx
            .send(frame)
            .await
            .map_err(|_| OcppError::ConnectionClosed)
    }
}
