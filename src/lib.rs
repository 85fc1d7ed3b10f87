//! Serial line broadcast bridge
//!
//! Reads newline-terminated records from one upstream device (a serial port,
//! or a TCP endpoint standing in for one) and fans every record out to any
//! number of TCP and WebSocket subscribers. Each record is prefixed with a
//! local `YYYYMMDDhhmmss` timestamp and a tab.
//!
//! ```text
//!   serial / tcp ──► LineSource ──► Broadcaster ──► SubscriberRegistry
//!                                                     │        │
//!                                                  TCP subs  WS subs
//! ```
//!
//! The upstream is reopened whenever it disappears, a subscriber that fails
//! is dropped without affecting anyone else, and admission caps how many
//! subscribers are connected at once.
//!
//! # Example
//!
//! ```no_run
//! use serial_bridge::{Bridge, BridgeConfig, UpstreamConfig};
//!
//! # async fn run() -> serial_bridge::Result<()> {
//! let config = BridgeConfig::default()
//!     .upstream(UpstreamConfig::parse("/dev/ttyUSB0", 115_200)?)
//!     .max_connections(4);
//!
//! let bridge = Bridge::bind(config).await?;
//! bridge
//!     .run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! # }
//! ```

pub mod broadcast;
pub mod error;
pub mod registry;
pub mod server;
pub mod source;
pub mod stats;

pub use broadcast::{BroadcastReport, Broadcaster, Record};
pub use error::{Error, Result};
pub use registry::{
    MessageSink, StreamSink, SubscriberHandle, SubscriberInfo, SubscriberRegistry, SubscriberSink,
    TransportKind,
};
pub use server::{
    AdmissionController, AdmissionPolicy, AdmissionToken, Bridge, BridgeConfig, ListenerContext,
    MessageListener, StreamListener,
};
pub use source::{
    BackoffPolicy, LineDevice, LineSource, ReconnectPolicy, SerialDevice, SourceState, TcpDevice,
    UpstreamConfig, UpstreamDevice,
};
pub use stats::{BridgeMetrics, MetricsSnapshot};
