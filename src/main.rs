//! Serial line broadcast bridge server

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use serial_bridge::server::parse_listen_addr;
use serial_bridge::{
    AdmissionPolicy, BackoffPolicy, Bridge, BridgeConfig, ReconnectPolicy, UpstreamConfig,
};

/// Broadcast lines from a serial port to TCP and WebSocket clients
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP listen address (`:port` binds all interfaces)
    #[arg(long, default_value = ":8080")]
    listen: String,

    /// WebSocket listen address
    #[arg(long, default_value = ":8081")]
    ws: String,

    /// Serial port name, or `tcp://host:port` for a TCP upstream
    #[arg(long, default_value = "COM1")]
    com: String,

    /// Baud rate
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// Maximum concurrent TCP clients
    #[arg(long = "max-conn", default_value_t = 10)]
    max_conn: usize,

    /// Count WebSocket clients against --max-conn too
    #[arg(long)]
    shared_limit: bool,

    /// Frames buffered per client before records are dropped for it
    #[arg(long, default_value_t = 256)]
    queue: usize,

    /// Seconds between attempts to open the upstream device
    #[arg(long, default_value_t = 5)]
    open_retry_secs: u64,

    /// Seconds to wait before reopening a lost upstream device
    #[arg(long, default_value_t = 2)]
    reopen_secs: u64,

    /// Seconds between stats log lines (0 disables)
    #[arg(long, default_value_t = 60)]
    stats_secs: u64,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> serial_bridge::Result<BridgeConfig> {
        let policy = if self.shared_limit {
            AdmissionPolicy::Shared
        } else {
            AdmissionPolicy::StreamOnly
        };
        let open_retry = Duration::from_secs(self.open_retry_secs);
        let reconnect = ReconnectPolicy::default()
            .open_backoff(BackoffPolicy::fixed(open_retry))
            .reopen_delay(Duration::from_secs(self.reopen_secs));

        Ok(BridgeConfig::default()
            .stream_addr(parse_listen_addr(&self.listen)?)
            .message_addr(parse_listen_addr(&self.ws)?)
            .upstream(UpstreamConfig::parse(&self.com, self.baud)?)
            .max_connections(self.max_conn)
            .admission_policy(policy)
            .queue_capacity(self.queue)
            .reconnect(reconnect)
            .stats_interval(Duration::from_secs(self.stats_secs)))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.as_str().into()),
        )
        .init();

    let config = match args.config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid arguments");
            return ExitCode::FAILURE;
        }
    };

    let bridge = match Bridge::bind(config).await {
        Ok(bridge) => bridge,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start bridge");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };

    match bridge.run(shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Bridge failed");
            ExitCode::FAILURE
        }
    }
}
