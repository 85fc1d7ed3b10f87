//! WebSocket listener
//!
//! Serves `/ws` with axum. Each upgraded socket becomes a message subscriber:
//! one text message per record. Text sent by the client is only logged.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;

use crate::error::{Error, Result};
use crate::registry::{MessageSink, SubscriberHandle, TransportKind};
use crate::server::admission::AdmissionToken;
use crate::server::context::ListenerContext;

/// Path WebSocket clients connect to
pub const WS_PATH: &str = "/ws";

/// Accepts WebSocket subscribers
pub struct MessageListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl MessageListener {
    /// Bind the listening socket
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, path = WS_PATH, "WebSocket server listening");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve upgrades until shutdown
    pub async fn serve(self, ctx: ListenerContext) -> Result<()> {
        let signal = ctx.clone();
        let app = router(ctx);

        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { signal.stopped().await })
        .await?;

        tracing::debug!(addr = %self.local_addr, "WebSocket listener stopped");
        Ok(())
    }
}

/// Routes served by the WebSocket listener
pub fn router(ctx: ListenerContext) -> Router {
    Router::new()
        .route(WS_PATH, get(upgrade_handler))
        .with_state(ctx)
}

async fn upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    State(ctx): State<ListenerContext>,
) -> Response {
    let token = if ctx.policy.limits_messages() {
        match ctx.admission.try_admit() {
            Some(token) => Some(token),
            None => {
                ctx.registry.metrics().connection_rejected();
                tracing::warn!(
                    peer = %peer_addr,
                    limit = ctx.admission.capacity(),
                    "WebSocket rejected: limit reached"
                );
                return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached")
                    .into_response();
            }
        }
    } else {
        None
    };

    ws.on_upgrade(move |socket| serve_subscriber(socket, peer_addr, token, ctx))
}

async fn serve_subscriber(
    socket: WebSocket,
    peer_addr: SocketAddr,
    token: Option<AdmissionToken>,
    ctx: ListenerContext,
) {
    let (mut sender, receiver) = socket.split();

    if let Err(e) = sender.send(Message::Text(ctx.welcome.to_string())).await {
        tracing::warn!(peer = %peer_addr, error = %e, "Failed to send welcome");
        return;
    }

    let handle = ctx
        .registry
        .add(
            TransportKind::Message,
            peer_addr,
            MessageSink::new(sender),
            token,
        )
        .await;

    drain(receiver, handle, peer_addr, &ctx).await;
    ctx.registry.remove(handle).await;
}

async fn drain(
    mut receiver: SplitStream<WebSocket>,
    handle: SubscriberHandle,
    peer_addr: SocketAddr,
    ctx: &ListenerContext,
) {
    loop {
        tokio::select! {
            _ = ctx.stopped() => break,
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    tracing::info!(
                        subscriber = %handle,
                        peer = %peer_addr,
                        message = %text,
                        "Received message"
                    );
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(subscriber = %handle, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    }
}
