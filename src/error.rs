//! Error types
//!
//! Only startup can fail. Upstream and subscriber failures are recovered
//! where they happen and never reach the caller.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors returned by the bridge
#[derive(Debug, Error)]
pub enum Error {
    /// A listener could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: SocketAddr,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error outside of a recoverable path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;
