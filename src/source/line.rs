//! Line source state machine
//!
//! ```text
//!   Closed ──► Opening ──► Open ──┐
//!     ▲          │ ▲        │ ▲   │ line read
//!     │          └─┘        │ └───┘
//!     │      open failed,   │
//!     │      backoff        │ EOF / read error,
//!     └─────────────────────┘ reopen delay
//! ```
//!
//! Opening is retried forever. The caller only ever sees complete lines.
//! Lines longer than the configured maximum are dropped whole.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use crate::broadcast::record::DELIMITER;
use crate::broadcast::{Broadcaster, Record};
use crate::stats::BridgeMetrics;

use super::backoff::ReconnectPolicy;
use super::device::LineDevice;

/// Default longest line accepted from the device, delimiter excluded
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Upstream connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// No handle; will open on the next read
    Closed,
    /// Open in progress or waiting to retry
    Opening,
    /// Handle open, reading lines
    Open,
}

/// Reads records from an upstream device, reopening it as needed
pub struct LineSource<D: LineDevice> {
    device: D,
    name: String,
    policy: ReconnectPolicy,
    reader: Option<BufReader<D::Reader>>,
    state: SourceState,
    opens: u64,
    max_line_len: usize,
    // Skipping the rest of an oversize line
    discarding: bool,
    metrics: Arc<BridgeMetrics>,
}

impl<D: LineDevice> LineSource<D> {
    /// Create a closed source; the device is opened on first read
    pub fn new(device: D, policy: ReconnectPolicy) -> Self {
        let name = device.describe();
        Self {
            device,
            name,
            policy,
            reader: None,
            state: SourceState::Closed,
            opens: 0,
            max_line_len: MAX_LINE_LEN,
            discarding: false,
            metrics: Arc::new(BridgeMetrics::new()),
        }
    }

    /// Report into shared metrics
    pub fn with_metrics(mut self, metrics: Arc<BridgeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Cap line length; longer lines are discarded up to the next delimiter
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len.max(1);
        self
    }

    /// Current connection state
    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Number of successful opens so far
    pub fn opens(&self) -> u64 {
        self.opens
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next complete line
    ///
    /// Never fails: open errors are retried with backoff, and EOF or read
    /// errors close the device and reopen it after the reopen delay. A
    /// partial line cut off by EOF is discarded, and so is any line longer
    /// than the maximum line length.
    pub async fn next_record(&mut self) -> Record {
        loop {
            let Some(reader) = self.reader.as_mut() else {
                self.open().await;
                continue;
            };

            let limit = (self.max_line_len as u64).saturating_add(1);
            let mut line = Vec::new();
            let read = reader.take(limit).read_until(DELIMITER, &mut line).await;
            match read {
                Ok(_) if line.last() == Some(&DELIMITER) => {
                    if std::mem::take(&mut self.discarding) {
                        continue;
                    }
                    self.metrics.record_read();
                    return Record::from_line(line);
                }
                Ok(n) if n as u64 == limit => {
                    if !self.discarding {
                        tracing::warn!(
                            device = %self.name,
                            max_line_len = self.max_line_len,
                            "Line too long, discarding up to the next delimiter"
                        );
                        self.discarding = true;
                    }
                }
                Ok(0) => {
                    tracing::info!(device = %self.name, "Upstream device closed");
                    self.close().await;
                }
                Ok(n) => {
                    tracing::debug!(
                        device = %self.name,
                        bytes = n,
                        "Upstream device closed mid-line, partial line discarded"
                    );
                    self.close().await;
                }
                Err(e) => {
                    self.metrics.upstream_failed();
                    tracing::warn!(
                        device = %self.name,
                        error = %e,
                        "Failed to read from upstream device"
                    );
                    self.close().await;
                }
            }
        }
    }

    /// Read and broadcast records forever
    pub async fn run(mut self, broadcaster: Broadcaster) {
        loop {
            let record = self.next_record().await;
            tracing::debug!(device = %self.name, record = %record.text(), "Record read");
            broadcaster.broadcast(&record).await;
        }
    }

    async fn open(&mut self) {
        self.state = SourceState::Opening;
        let mut attempt: u32 = 0;

        loop {
            match self.device.open().await {
                Ok(reader) => {
                    self.reader = Some(BufReader::new(reader));
                    self.state = SourceState::Open;
                    self.opens += 1;
                    self.metrics.upstream_opened();
                    tracing::info!(device = %self.name, "Upstream device opened");
                    return;
                }
                Err(e) => {
                    self.metrics.upstream_failed();
                    let delay = self.policy.open_backoff.next(attempt);
                    tracing::warn!(
                        device = %self.name,
                        error = %e,
                        attempt = attempt + 1,
                        retry_in = ?delay,
                        "Failed to open upstream device"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    async fn close(&mut self) {
        self.reader = None;
        self.discarding = false;
        self.state = SourceState::Closed;
        tokio::time::sleep(self.policy.reopen_delay).await;
    }
}
