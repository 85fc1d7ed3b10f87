//! Upstream line source
//!
//! Opens the upstream device, reads newline-terminated lines from it and
//! recovers from the device disappearing. See [`LineSource`].

pub mod backoff;
pub mod device;
pub mod line;

pub use backoff::{BackoffPolicy, ReconnectPolicy};
pub use device::{LineDevice, SerialDevice, TcpDevice, UpstreamConfig, UpstreamDevice};
pub use line::{LineSource, SourceState};
pub use line::MAX_LINE_LEN;
