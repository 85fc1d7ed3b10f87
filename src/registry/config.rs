//! Registry configuration

use std::time::Duration;

/// Subscriber registry tuning
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Frames queued per subscriber before new records are shed
    pub queue_capacity: usize,

    /// How long shutdown waits for a subscriber to close its transport
    pub close_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            close_timeout: Duration::from_secs(2),
        }
    }
}

impl RegistryConfig {
    /// Set the per-subscriber queue capacity (at least 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the shutdown close timeout
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}
