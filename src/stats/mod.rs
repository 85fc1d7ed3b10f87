//! Bridge statistics

pub mod metrics;
pub mod reporter;

pub use metrics::{BridgeMetrics, MetricsSnapshot};
pub use reporter::spawn_reporter;
