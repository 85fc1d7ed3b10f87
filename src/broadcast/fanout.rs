//! Record fan-out
//!
//! Hands one record to every registered subscriber without blocking. Frames
//! are queued, not written: the write happens on each subscriber's own
//! delivery task, so a slow or dead peer never holds up the others.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;

use crate::registry::{SubscriberRegistry, TransportKind};

use super::record::Record;

/// Outcome of broadcasting one record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Frames queued for delivery
    pub queued: usize,
    /// Subscribers whose queue was full; the record was dropped for them
    pub shed: usize,
    /// Subscribers already torn down; they were removed
    pub closed: usize,
}

impl BroadcastReport {
    /// Number of subscribers the record was offered to
    pub fn offered(&self) -> usize {
        self.queued + self.shed + self.closed
    }
}

/// Distributes records to the subscribers of a registry
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
}

impl Broadcaster {
    /// Create a broadcaster over `registry`
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    /// Registry this broadcaster reads from
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Queue `record` for every current subscriber
    ///
    /// Subscribers registered after the snapshot is taken do not see this
    /// record. Returns immediately, without formatting, if nobody is
    /// listening.
    pub async fn broadcast(&self, record: &Record) -> BroadcastReport {
        let targets = self.registry.targets().await;
        let mut report = BroadcastReport::default();
        if targets.is_empty() {
            return report;
        }

        let timestamp = record.timestamp();
        let mut stream_frame: Option<Bytes> = None;
        let mut message_frame: Option<Bytes> = None;

        let mut dead = Vec::new();
        for target in targets {
            let slot = match target.handle.kind {
                TransportKind::Stream => &mut stream_frame,
                TransportKind::Message => &mut message_frame,
            };
            let frame = slot
                .get_or_insert_with(|| record.frame(target.handle.kind, &timestamp))
                .clone();

            match target.tx.try_send(frame) {
                Ok(()) => report.queued += 1,
                Err(TrySendError::Full(_)) => {
                    report.shed += 1;
                    tracing::debug!(
                        subscriber = %target.handle,
                        peer = %target.peer,
                        "Subscriber queue full, record dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    report.closed += 1;
                    dead.push(target.handle);
                }
            }
        }

        for handle in dead {
            self.registry.remove(handle).await;
        }

        self.registry
            .metrics()
            .record_broadcast(report.queued as u64, report.shed as u64);

        tracing::trace!(
            offered = report.offered(),
            queued = report.queued,
            shed = report.shed,
            closed = report.closed,
            "Record broadcast"
        );

        report
    }
}
