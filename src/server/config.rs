//! Bridge configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::registry::RegistryConfig;
use crate::server::admission::AdmissionPolicy;
use crate::source::{ReconnectPolicy, UpstreamConfig};

/// Default TCP subscriber port
pub const DEFAULT_STREAM_PORT: u16 = 8080;

/// Default WebSocket subscriber port
pub const DEFAULT_MESSAGE_PORT: u16 = 8081;

/// Default cap on admitted subscribers
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Bridge configuration options
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address for raw TCP subscribers
    pub stream_addr: SocketAddr,

    /// Address for WebSocket subscribers
    pub message_addr: SocketAddr,

    /// Upstream device
    pub upstream: UpstreamConfig,

    /// Maximum concurrently admitted subscribers (>= 1)
    pub max_connections: usize,

    /// Which transports count against `max_connections`
    pub admission_policy: AdmissionPolicy,

    /// Frames buffered per subscriber before records are shed
    pub queue_capacity: usize,

    /// Time each subscriber gets to close at shutdown
    pub close_timeout: Duration,

    /// Enable TCP_NODELAY on subscriber sockets
    pub tcp_nodelay: bool,

    /// Upstream reconnection timing
    pub reconnect: ReconnectPolicy,

    /// Stats log interval (zero disables)
    pub stats_interval: Duration,

    /// Buffer used to discard inbound TCP bytes
    pub drain_buffer_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let registry = RegistryConfig::default();
        Self {
            stream_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_STREAM_PORT),
            message_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_MESSAGE_PORT),
            upstream: UpstreamConfig::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            admission_policy: AdmissionPolicy::StreamOnly,
            queue_capacity: registry.queue_capacity,
            close_timeout: registry.close_timeout,
            tcp_nodelay: true,
            reconnect: ReconnectPolicy::default(),
            stats_interval: Duration::from_secs(60),
            drain_buffer_size: 1024,
        }
    }
}

impl BridgeConfig {
    /// Set the TCP subscriber address
    pub fn stream_addr(mut self, addr: SocketAddr) -> Self {
        self.stream_addr = addr;
        self
    }

    /// Set the WebSocket subscriber address
    pub fn message_addr(mut self, addr: SocketAddr) -> Self {
        self.message_addr = addr;
        self
    }

    /// Set the upstream device
    pub fn upstream(mut self, upstream: UpstreamConfig) -> Self {
        self.upstream = upstream;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the admission policy
    pub fn admission_policy(mut self, policy: AdmissionPolicy) -> Self {
        self.admission_policy = policy;
        self
    }

    /// Set the per-subscriber queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the shutdown close timeout
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Set the reconnect policy
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Set the stats interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Set the inbound drain buffer size
    pub fn drain_buffer_size(mut self, size: usize) -> Self {
        self.drain_buffer_size = size;
        self
    }

    /// Check the configuration for values the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.drain_buffer_size == 0 {
            return Err(Error::Config(
                "drain_buffer_size must be at least 1".to_string(),
            ));
        }
        if self.stream_addr.port() != 0 && self.stream_addr == self.message_addr {
            return Err(Error::Config(format!(
                "TCP and WebSocket listeners both use {}",
                self.stream_addr
            )));
        }
        Ok(())
    }

    /// Registry settings derived from this configuration
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::default()
            .queue_capacity(self.queue_capacity)
            .close_timeout(self.close_timeout)
    }
}

/// Parse a listen address
///
/// Accepts `host:port`, `:port` (all interfaces) and a bare port.
pub fn parse_listen_addr(s: &str) -> Result<SocketAddr> {
    let s = s.trim();
    let port_only = s.strip_prefix(':').unwrap_or(s);

    if let Ok(port) = port_only.parse::<u16>() {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }

    s.parse()
        .map_err(|_| Error::Config(format!("invalid listen address: {}", s)))
}
