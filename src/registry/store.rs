//! Subscriber registry implementation
//!
//! The central registry of live subscribers, partitioned by transport kind.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, RwLock};

use crate::server::admission::AdmissionToken;
use crate::stats::BridgeMetrics;

use super::config::RegistryConfig;
use super::delivery::Delivery;
use super::entry::{SubscriberEntry, SubscriberHandle, SubscriberInfo, Target, TransportKind};
use super::sink::SubscriberSink;

#[derive(Default)]
struct Partitions {
    stream: HashMap<u64, SubscriberEntry>,
    message: HashMap<u64, SubscriberEntry>,
}

impl Partitions {
    fn get(&self, kind: TransportKind) -> &HashMap<u64, SubscriberEntry> {
        match kind {
            TransportKind::Stream => &self.stream,
            TransportKind::Message => &self.message,
        }
    }

    fn get_mut(&mut self, kind: TransportKind) -> &mut HashMap<u64, SubscriberEntry> {
        match kind {
            TransportKind::Stream => &mut self.stream,
            TransportKind::Message => &mut self.message,
        }
    }

    fn iter(&self, kind: Option<TransportKind>) -> impl Iterator<Item = &SubscriberEntry> {
        let stream = kind.map_or(true, |k| k == TransportKind::Stream);
        let message = kind.map_or(true, |k| k == TransportKind::Message);
        self.stream
            .values()
            .filter(move |_| stream)
            .chain(self.message.values().filter(move |_| message))
    }
}

/// Registry of every live subscriber
///
/// All state sits behind one `RwLock`. Fan-out and count queries take the
/// read lock; add and remove take the write lock. No I/O happens while the
/// lock is held: transports are written by per-subscriber delivery tasks.
pub struct SubscriberRegistry {
    partitions: RwLock<Partitions>,

    next_id: AtomicU64,

    config: RegistryConfig,

    metrics: Arc<BridgeMetrics>,
}

impl SubscriberRegistry {
    /// Create a registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_metrics(config, Arc::new(BridgeMetrics::new()))
    }

    /// Create a registry that reports into shared metrics
    pub fn with_metrics(config: RegistryConfig, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            partitions: RwLock::new(Partitions::default()),
            next_id: AtomicU64::new(1),
            config,
            metrics,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Metrics this registry reports into
    pub fn metrics(&self) -> &Arc<BridgeMetrics> {
        &self.metrics
    }

    /// Register a subscriber
    ///
    /// Spawns the subscriber's delivery task, which owns `sink` (and `token`,
    /// if any) until the subscriber is removed. Capacity is enforced by the
    /// caller through admission, so this never fails.
    pub async fn add<S: SubscriberSink>(
        self: &Arc<Self>,
        kind: TransportKind,
        peer: SocketAddr,
        sink: S,
        token: Option<AdmissionToken>,
    ) -> SubscriberHandle {
        let handle = SubscriberHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
        };
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);

        let delivery = Delivery {
            handle,
            peer,
            sink,
            rx,
            registry: Arc::downgrade(self),
            token,
            metrics: Arc::clone(&self.metrics),
        };
        let task = tokio::spawn(delivery.run());

        let entry = SubscriberEntry {
            info: SubscriberInfo {
                handle,
                peer,
                connected_at: Instant::now(),
            },
            tx,
            task,
        };

        let mut partitions = self.partitions.write().await;
        partitions.get_mut(kind).insert(handle.id, entry);
        self.metrics.subscriber_added();

        tracing::info!(
            subscriber = %handle,
            peer = %peer,
            tcp = partitions.stream.len(),
            ws = partitions.message.len(),
            "Subscriber connected"
        );

        handle
    }

    /// Remove a subscriber
    ///
    /// Closes its transport (asynchronously, via its delivery task) and
    /// releases its admission token. Returns `false` if the handle was not
    /// registered, in which case nothing happens.
    pub async fn remove(&self, handle: SubscriberHandle) -> bool {
        let mut partitions = self.partitions.write().await;

        let Some(entry) = partitions.get_mut(handle.kind).remove(&handle.id) else {
            return false;
        };
        self.metrics.subscriber_removed();

        tracing::info!(
            subscriber = %handle,
            peer = %entry.info.peer,
            connected_for = ?entry.info.connected_at.elapsed(),
            tcp = partitions.stream.len(),
            ws = partitions.message.len(),
            "Subscriber disconnected"
        );

        true
    }

    /// Number of subscribers of one kind
    pub async fn count(&self, kind: TransportKind) -> usize {
        self.partitions.read().await.get(kind).len()
    }

    /// Number of subscribers of all kinds
    pub async fn total(&self) -> usize {
        let partitions = self.partitions.read().await;
        partitions.stream.len() + partitions.message.len()
    }

    /// Check whether a handle is currently registered
    pub async fn contains(&self, handle: SubscriberHandle) -> bool {
        self.partitions
            .read()
            .await
            .get(handle.kind)
            .contains_key(&handle.id)
    }

    /// Snapshot of current subscribers, optionally filtered by kind
    ///
    /// The snapshot is taken under the read lock and may be stale by the time
    /// the caller looks at it.
    pub async fn snapshot(&self, kind: Option<TransportKind>) -> Vec<SubscriberInfo> {
        let partitions = self.partitions.read().await;
        partitions.iter(kind).map(|e| e.info.clone()).collect()
    }

    /// Snapshot of fan-out targets for all subscribers
    pub(crate) async fn targets(&self) -> Vec<Target> {
        let partitions = self.partitions.read().await;
        partitions.iter(None).map(SubscriberEntry::target).collect()
    }

    /// Remove every subscriber and wait for their transports to close
    ///
    /// All subscribers share a single `close_timeout` to flush and close;
    /// stragglers are aborted. Returns the number of subscribers that were
    /// registered.
    pub async fn close_all(&self) -> usize {
        let entries: Vec<SubscriberEntry> = {
            let mut partitions = self.partitions.write().await;
            TransportKind::ALL
                .into_iter()
                .flat_map(|k| std::mem::take(partitions.get_mut(k)).into_values())
                .collect()
        };

        let count = entries.len();
        let closing: Vec<_> = entries
            .into_iter()
            .map(|SubscriberEntry { info, tx, task }| {
                drop(tx);
                self.metrics.subscriber_removed();
                (info, task)
            })
            .collect();

        // One deadline for all subscribers, not one per subscriber
        let deadline = tokio::time::Instant::now() + self.config.close_timeout;
        for (info, mut task) in closing {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                tracing::warn!(
                    subscriber = %info.handle,
                    peer = %info.peer,
                    "Subscriber did not close in time, aborting"
                );
                task.abort();
            }
        }

        if count > 0 {
            tracing::info!(closed = count, "All subscribers closed");
        }
        count
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
