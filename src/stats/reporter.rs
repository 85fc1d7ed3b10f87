//! Periodic stats logging

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::registry::{SubscriberRegistry, TransportKind};
use crate::server::admission::AdmissionController;

/// Log a metrics summary every `interval` until the task is aborted
pub fn spawn_reporter(
    registry: Arc<SubscriberRegistry>,
    admission: AdmissionController,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let stats = registry.metrics().snapshot();
            let tcp = registry.count(TransportKind::Stream).await;
            let ws = registry.count(TransportKind::Message).await;
            tracing::info!(
                tcp,
                ws,
                tokens_available = admission.available(),
                records = stats.records_read,
                frames_written = stats.frames_written,
                bytes_per_sec = stats.write_rate(),
                shed = stats.frames_shed,
                write_failures = stats.write_failures,
                rejected = stats.connections_rejected,
                upstream_opens = stats.upstream_opens,
                upstream_failures = stats.upstream_failures,
                "Bridge stats"
            );
        }
    })
}
