//! Per-subscriber delivery task
//!
//! Every registered subscriber gets one task that drains its frame queue into
//! its sink. Records reach a subscriber in the order they were queued, and a
//! slow or broken subscriber only ever stalls its own task.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::server::admission::AdmissionToken;
use crate::stats::BridgeMetrics;

use super::entry::SubscriberHandle;
use super::sink::SubscriberSink;
use super::store::SubscriberRegistry;

/// How a delivery task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DeliveryOutcome {
    /// Queue closed by the registry (remove or shutdown)
    Removed,
    /// A write failed; the task removed its own subscriber
    WriteFailed,
}

pub(super) struct Delivery<S> {
    pub(super) handle: SubscriberHandle,
    pub(super) peer: SocketAddr,
    pub(super) sink: S,
    pub(super) rx: mpsc::Receiver<Bytes>,
    pub(super) registry: Weak<SubscriberRegistry>,
    pub(super) token: Option<AdmissionToken>,
    pub(super) metrics: Arc<BridgeMetrics>,
}

impl<S: SubscriberSink> Delivery<S> {
    pub(super) async fn run(mut self) {
        let outcome = self.pump().await;

        if outcome == DeliveryOutcome::WriteFailed {
            if let Some(registry) = self.registry.upgrade() {
                registry.remove(self.handle).await;
            }
        }

        // Nothing is written after this point
        self.rx.close();
        self.sink.close().await;

        if let Some(token) = self.token.take() {
            token.release();
        }

        tracing::debug!(
            subscriber = %self.handle,
            peer = %self.peer,
            outcome = ?outcome,
            "Subscriber transport closed"
        );
    }

    async fn pump(&mut self) -> DeliveryOutcome {
        while let Some(frame) = self.rx.recv().await {
            let len = frame.len();
            match self.sink.send(frame).await {
                Ok(()) => self.metrics.frame_written(len),
                Err(e) => {
                    self.metrics.write_failed();
                    tracing::warn!(
                        subscriber = %self.handle,
                        peer = %self.peer,
                        error = %e,
                        "Failed to send data to subscriber"
                    );
                    return DeliveryOutcome::WriteFailed;
                }
            }
        }
        DeliveryOutcome::Removed
    }
}
