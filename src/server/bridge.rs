//! Bridge runtime
//!
//! Binds both listeners up front, then runs the line source, the accept
//! loops and the stats reporter until shutdown. On shutdown every
//! subscriber is closed exactly once.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinError;

use crate::broadcast::Broadcaster;
use crate::error::{Error, Result};
use crate::registry::SubscriberRegistry;
use crate::server::admission::AdmissionController;
use crate::server::config::BridgeConfig;
use crate::server::context::{welcome_message, ListenerContext};
use crate::server::listener::StreamListener;
use crate::server::websocket::MessageListener;
use crate::source::{LineDevice, LineSource};
use crate::stats::{spawn_reporter, BridgeMetrics};

/// Serial line broadcast bridge
pub struct Bridge {
    config: BridgeConfig,
    stream: StreamListener,
    message: MessageListener,
    registry: Arc<SubscriberRegistry>,
    admission: AdmissionController,
}

impl Bridge {
    /// Validate `config` and bind both listeners
    ///
    /// Fails if either address cannot be bound; nothing is left running.
    pub async fn bind(config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        let stream = StreamListener::bind(config.stream_addr).await?;
        let message = MessageListener::bind(config.message_addr).await?;

        let metrics = Arc::new(BridgeMetrics::new());
        let registry = Arc::new(SubscriberRegistry::with_metrics(
            config.registry_config(),
            metrics,
        ));
        let admission = AdmissionController::new(config.max_connections);

        Ok(Self {
            config,
            stream,
            message,
            registry,
            admission,
        })
    }

    /// Bound TCP subscriber address
    pub fn stream_addr(&self) -> SocketAddr {
        self.stream.local_addr()
    }

    /// Bound WebSocket subscriber address
    pub fn message_addr(&self) -> SocketAddr {
        self.message.local_addr()
    }

    /// Subscriber registry
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Admission token pool
    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Bridge metrics
    pub fn metrics(&self) -> &Arc<BridgeMetrics> {
        self.registry.metrics()
    }

    /// Run with the configured upstream until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let device = self.config.upstream.device();
        self.run_until(device, shutdown).await
    }

    /// Run with an explicit upstream device until `shutdown` resolves
    pub async fn run_until<D, F>(self, device: D, shutdown: F) -> Result<()>
    where
        D: LineDevice,
        F: Future<Output = ()>,
    {
        let Bridge {
            config,
            stream,
            message,
            registry,
            admission,
        } = self;

        let (stop_tx, stop_rx) = watch::channel(false);
        let metrics = Arc::clone(registry.metrics());
        let source = LineSource::new(device, config.reconnect).with_metrics(metrics);
        let device_name = source.name().to_string();

        let ctx = ListenerContext {
            registry: Arc::clone(&registry),
            admission: admission.clone(),
            policy: config.admission_policy,
            welcome: Arc::from(welcome_message(&device_name)),
            tcp_nodelay: config.tcp_nodelay,
            drain_buffer_size: config.drain_buffer_size,
            shutdown: stop_rx,
        };

        tracing::info!(
            device = %device_name,
            tcp = %stream.local_addr(),
            ws = %message.local_addr(),
            max_connections = config.max_connections,
            policy = ?config.admission_policy,
            "Bridge started"
        );

        let source_task = tokio::spawn(source.run(Broadcaster::new(Arc::clone(&registry))));
        let stream_task = tokio::spawn(stream.serve(ctx.clone()));
        let mut message_task = tokio::spawn(message.serve(ctx));
        let stats_task = (!config.stats_interval.is_zero()).then(|| {
            spawn_reporter(
                Arc::clone(&registry),
                admission.clone(),
                config.stats_interval,
            )
        });

        let failed = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                None
            }
            res = &mut message_task => Some(flatten(res)),
        };

        let _ = stop_tx.send(true);
        source_task.abort();
        if let Some(task) = stats_task {
            task.abort();
        }

        let result = match failed {
            Some(res) => res,
            None => match tokio::time::timeout(config.close_timeout, message_task).await {
                Ok(res) => flatten(res),
                Err(_) => {
                    tracing::warn!("WebSocket listener did not stop in time");
                    Ok(())
                }
            },
        };
        if let Err(e) = flatten(stream_task.await) {
            tracing::error!(error = %e, "TCP listener failed");
        }

        let closed = registry.close_all().await;
        tracing::info!(closed, "Bridge stopped");

        result
    }
}

fn flatten(res: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    res.map_err(|e| Error::Io(io::Error::other(e)))?
}
