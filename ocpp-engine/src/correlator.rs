//! Response correlation
//!
//! The receive loop never handles responses inline: it pushes every
//! CALLRESULT and CALLERROR onto a queue. The queue's receiving end sits
//! behind an async mutex, and holding that mutex is what makes an outbound
//! call "in flight". Only one call can hold it, so there is never more than
//! one consumer draining the queue.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::warn;

use crate::messages::OcppMessage;

/// An outstanding outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCall {
    pub message_id: String,
    pub deadline: Instant,
}

impl PendingCall {
    /// Pending call whose deadline is `timeout` from now
    pub fn new(message_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            message_id: message_id.into(),
            deadline: Instant::now() + timeout,
        }
    }
}

/// Shared response queue plus the single-flight lock guarding its consumer
pub struct ResponseCorrelator {
    tx: mpsc::UnboundedSender<OcppMessage>,
    rx: Mutex<mpsc::UnboundedReceiver<OcppMessage>>,
}

impl ResponseCorrelator {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Queue a response for whichever call is (or will be) in flight
    pub fn deliver(&self, response: OcppMessage) {
        if let Err(e) = self.tx.send(response) {
            warn!("Response queue closed, dropping {:?}", e.0);
        }
    }

    /// Wait until no other call is in flight and claim the queue
    pub async fn acquire(&self) -> InFlight<'_> {
        InFlight {
            rx: self.rx.lock().await,
        }
    }
}

impl Default for ResponseCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to the response queue; dropping it releases the lock
pub struct InFlight<'a> {
    rx: MutexGuard<'a, mpsc::UnboundedReceiver<OcppMessage>>,
}

impl InFlight<'_> {
    /// Throw away responses queued before this call was sent. They answer
    /// calls that already gave up.
    pub fn discard_stale(&mut self) -> usize {
        let mut discarded = 0;
        while let Ok(stale) = self.rx.try_recv() {
            warn!("Discarding stale response with message id {}", stale.message_id());
            discarded += 1;
        }
        discarded
    }

    /// Take queued responses until one matches `pending`. Mismatches are
    /// dropped; the wait never extends past the original deadline.
    /// Returns `None` once the deadline passes.
    pub async fn wait_for(&mut self, pending: &PendingCall) -> Option<OcppMessage> {
        loop {
            match tokio::time::timeout_at(pending.deadline, self.rx.recv()).await {
                Ok(Some(response)) if response.message_id() == pending.message_id => {
                    return Some(response);
                }
                Ok(Some(response)) => {
                    warn!(
                        "Ignoring response with unknown message id {} (waiting for {})",
                        response.message_id(),
                        pending.message_id
                    );
                }
                // The sender lives as long as the correlator
                Ok(None) => return None,
                Err(_) => return None,
            }
        }
    }
}
