//! TCP stream listener
//!
//! Handles the accept loop and spawns one handler per admitted connection.
//! Refused connections are closed before anything is written to them.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::registry::{StreamSink, SubscriberHandle, TransportKind};
use crate::server::admission::AdmissionToken;
use crate::server::context::ListenerContext;

/// Accepts raw TCP subscribers
pub struct StreamListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl StreamListener {
    /// Bind the listening socket
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "TCP server listening");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until shutdown
    pub async fn serve(self, ctx: ListenerContext) -> Result<()> {
        tokio::select! {
            _ = ctx.stopped() => {
                tracing::debug!(addr = %self.local_addr, "TCP listener stopped");
            }
            _ = self.accept_loop(&ctx) => {}
        }
        Ok(())
    }

    async fn accept_loop(&self, ctx: &ListenerContext) {
        loop {
            match self.listener.accept().await {
                Ok((socket, peer_addr)) => {
                    handle_connection(socket, peer_addr, ctx);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

fn handle_connection(socket: TcpStream, peer_addr: SocketAddr, ctx: &ListenerContext) {
    let Some(token) = ctx.admission.try_admit() else {
        ctx.registry.metrics().connection_rejected();
        tracing::warn!(
            peer = %peer_addr,
            limit = ctx.admission.capacity(),
            "Connection rejected: limit reached"
        );
        return;
    };

    tracing::debug!(
        peer = %peer_addr,
        available = ctx.admission.available(),
        "New connection"
    );

    let ctx = ctx.clone();
    tokio::spawn(async move {
        serve_subscriber(socket, peer_addr, token, ctx).await;
    });
}

async fn serve_subscriber(
    socket: TcpStream,
    peer_addr: SocketAddr,
    token: AdmissionToken,
    ctx: ListenerContext,
) {
    if ctx.tcp_nodelay {
        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!(peer = %peer_addr, error = %e, "Failed to configure socket");
        }
    }

    let (reader, mut writer) = socket.into_split();

    let welcome = format!("{}\n", ctx.welcome);
    if let Err(e) = writer.write_all(welcome.as_bytes()).await {
        tracing::warn!(peer = %peer_addr, error = %e, "Failed to send welcome");
        return;
    }

    let handle = ctx
        .registry
        .add(
            TransportKind::Stream,
            peer_addr,
            StreamSink::new(writer),
            Some(token),
        )
        .await;

    drain(reader, handle, &ctx).await;
    ctx.registry.remove(handle).await;
}

/// Read and discard inbound bytes until the peer goes away or shutdown
async fn drain<R>(mut reader: R, handle: SubscriberHandle, ctx: &ListenerContext)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; ctx.drain_buffer_size.max(1)];
    loop {
        tokio::select! {
            _ = ctx.stopped() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    tracing::trace!(subscriber = %handle, bytes = n, "Discarded inbound bytes");
                }
                Err(e) => {
                    tracing::debug!(subscriber = %handle, error = %e, "Read error");
                    break;
                }
            }
        }
    }
}
