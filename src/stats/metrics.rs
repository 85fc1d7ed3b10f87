//! Statistics and metrics for the bridge

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Bridge-wide counters
///
/// Updated lock-free from the source loop, listeners and delivery tasks.
#[derive(Debug)]
pub struct BridgeMetrics {
    started_at: Instant,
    records_read: AtomicU64,
    records_broadcast: AtomicU64,
    frames_queued: AtomicU64,
    frames_shed: AtomicU64,
    frames_written: AtomicU64,
    bytes_written: AtomicU64,
    write_failures: AtomicU64,
    subscribers_added: AtomicU64,
    subscribers_removed: AtomicU64,
    connections_rejected: AtomicU64,
    upstream_opens: AtomicU64,
    upstream_failures: AtomicU64,
}

/// Point-in-time copy of [`BridgeMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Time since the metrics were created
    pub uptime: Duration,
    /// Lines read from the upstream device
    pub records_read: u64,
    /// Records handed to at least one subscriber queue
    pub records_broadcast: u64,
    /// Frames queued for delivery
    pub frames_queued: u64,
    /// Frames dropped because a subscriber queue was full
    pub frames_shed: u64,
    /// Frames written to subscriber transports
    pub frames_written: u64,
    /// Bytes written to subscriber transports
    pub bytes_written: u64,
    /// Subscriber writes that failed
    pub write_failures: u64,
    /// Subscribers registered
    pub subscribers_added: u64,
    /// Subscribers removed
    pub subscribers_removed: u64,
    /// Connections refused by admission
    pub connections_rejected: u64,
    /// Successful upstream opens
    pub upstream_opens: u64,
    /// Failed upstream opens and reads
    pub upstream_failures: u64,
}

impl BridgeMetrics {
    /// Create zeroed metrics
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            records_read: AtomicU64::new(0),
            records_broadcast: AtomicU64::new(0),
            frames_queued: AtomicU64::new(0),
            frames_shed: AtomicU64::new(0),
            frames_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            subscribers_added: AtomicU64::new(0),
            subscribers_removed: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            upstream_opens: AtomicU64::new(0),
            upstream_failures: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_read(&self) {
        self.records_read.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_broadcast(&self, queued: u64, shed: u64) {
        self.records_broadcast.fetch_add(1, Ordering::Relaxed);
        self.frames_queued.fetch_add(queued, Ordering::Relaxed);
        self.frames_shed.fetch_add(shed, Ordering::Relaxed);
    }

    pub(crate) fn frame_written(&self, len: usize) {
        self.frames_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub(crate) fn write_failed(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn subscriber_added(&self) {
        self.subscribers_added.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn subscriber_removed(&self) {
        self.subscribers_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn upstream_opened(&self) {
        self.upstream_opens.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn upstream_failed(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime: self.started_at.elapsed(),
            records_read: self.records_read.load(Ordering::Relaxed),
            records_broadcast: self.records_broadcast.load(Ordering::Relaxed),
            frames_queued: self.frames_queued.load(Ordering::Relaxed),
            frames_shed: self.frames_shed.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            subscribers_added: self.subscribers_added.load(Ordering::Relaxed),
            subscribers_removed: self.subscribers_removed.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            upstream_opens: self.upstream_opens.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSnapshot {
    /// Subscribers currently registered according to the counters
    pub fn active_subscribers(&self) -> u64 {
        self.subscribers_added
            .saturating_sub(self.subscribers_removed)
    }

    /// Average bytes written per second since start
    pub fn write_rate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            self.bytes_written / secs
        } else {
            0
        }
    }
}
