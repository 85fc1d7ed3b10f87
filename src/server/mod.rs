//! Transport listeners and the bridge runtime

pub mod admission;
pub mod bridge;
pub mod config;
pub mod context;
pub mod listener;
pub mod websocket;

pub use admission::{AdmissionController, AdmissionPolicy, AdmissionToken};
pub use bridge::Bridge;
pub use config::{parse_listen_addr, BridgeConfig};
pub use context::{welcome_message, ListenerContext};
pub use listener::StreamListener;
pub use websocket::MessageListener;
