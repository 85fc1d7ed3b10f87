//! Subscriber handles and per-subscriber registry state

use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Transport a subscriber is connected over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Raw TCP byte stream
    Stream,
    /// WebSocket, one text message per record
    Message,
}

impl TransportKind {
    /// Both kinds, in partition order
    pub const ALL: [TransportKind; 2] = [TransportKind::Stream, TransportKind::Message];
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Stream => write!(f, "tcp"),
            TransportKind::Message => write!(f, "ws"),
        }
    }
}

/// Identifies a registered subscriber
///
/// Handles are never reused, so removing a stale handle is a harmless no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberHandle {
    /// Unique id assigned on registration
    pub id: u64,
    /// Partition the subscriber lives in
    pub kind: TransportKind,
}

impl std::fmt::Display for SubscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Read-only view of a registered subscriber
#[derive(Debug, Clone)]
pub struct SubscriberInfo {
    /// Subscriber handle
    pub handle: SubscriberHandle,
    /// Remote peer address
    pub peer: SocketAddr,
    /// When the subscriber was registered
    pub connected_at: Instant,
}

/// Fan-out target: where to queue frames for one subscriber
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub(crate) handle: SubscriberHandle,
    pub(crate) peer: SocketAddr,
    pub(crate) tx: mpsc::Sender<Bytes>,
}

/// Entry for a single subscriber in the registry
///
/// Dropping the entry drops the queue sender, which tells the delivery task
/// to close the transport.
pub(super) struct SubscriberEntry {
    pub(super) info: SubscriberInfo,
    pub(super) tx: mpsc::Sender<Bytes>,
    pub(super) task: JoinHandle<()>,
}

impl SubscriberEntry {
    pub(super) fn target(&self) -> Target {
        Target {
            handle: self.info.handle,
            peer: self.info.peer,
            tx: self.tx.clone(),
        }
    }
}
