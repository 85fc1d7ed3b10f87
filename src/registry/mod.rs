//! Subscriber registry
//!
//! The registry tracks every live subscriber, partitioned by transport kind.
//! Each subscriber owns a bounded frame queue drained by its own delivery
//! task, so fan-out never performs I/O and never holds the registry lock
//! across a write.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<SubscriberRegistry>
//!                   ┌────────────────────────────┐
//!                   │ RwLock<Partitions {        │
//!                   │   stream:  id -> entry,    │
//!                   │   message: id -> entry,    │
//!                   │ }>                         │
//!                   └─────────────┬──────────────┘
//!                                 │ targets() snapshot
//!         ┌───────────────────────┼───────────────────────┐
//!         ▼                       ▼                       ▼
//!    mpsc queue              mpsc queue              mpsc queue
//!         │                       │                       │
//!   [delivery task]         [delivery task]         [delivery task]
//!    StreamSink (TCP)        StreamSink (TCP)       MessageSink (WS)
//! ```
//!
//! Removing an entry drops its queue sender; the delivery task then closes
//! the transport and releases the subscriber's admission token.

pub mod config;
mod delivery;
pub mod entry;
pub mod sink;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{SubscriberHandle, SubscriberInfo, TransportKind};
pub use sink::{MessageSink, StreamSink, SubscriberSink};
pub use store::SubscriberRegistry;
