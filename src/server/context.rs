//! State shared by the transport listeners

use std::sync::Arc;

use tokio::sync::watch;

use crate::registry::SubscriberRegistry;

use super::admission::{AdmissionController, AdmissionPolicy};

/// Welcome text sent to every admitted subscriber
pub fn welcome_message(device: &str) -> String {
    format!("Connected to {}. Waiting for data...", device)
}

/// Everything a listener needs to admit and register subscribers
#[derive(Clone)]
pub struct ListenerContext {
    /// Registry new subscribers are added to
    pub registry: Arc<SubscriberRegistry>,
    /// Token pool bounding concurrent subscribers
    pub admission: AdmissionController,
    /// Which transports draw from `admission`
    pub policy: AdmissionPolicy,
    /// Welcome text, without a line terminator
    pub welcome: Arc<str>,
    /// Set `TCP_NODELAY` on accepted stream sockets
    pub tcp_nodelay: bool,
    /// Buffer used to discard inbound bytes on stream sockets
    pub drain_buffer_size: usize,
    /// Flips to `true` once when the bridge shuts down
    pub shutdown: watch::Receiver<bool>,
}

impl ListenerContext {
    /// Resolves once shutdown has been signalled
    ///
    /// Also resolves if the signalling side is gone.
    pub async fn stopped(&self) {
        let mut shutdown = self.shutdown.clone();
        let _ = shutdown.wait_for(|stopped| *stopped).await;
    }

    /// Whether shutdown has been signalled
    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }
}
