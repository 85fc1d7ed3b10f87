//! Subscriber transports
//!
//! A sink is the write side of a subscriber connection. Once a subscriber is
//! registered its sink is owned by a single delivery task, which is the only
//! code that ever writes to it or closes it.

use std::future::Future;
use std::io;

use axum::extract::ws::Message;
use bytes::Bytes;
use futures::{Sink, SinkExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Write side of a subscriber connection
pub trait SubscriberSink: Send + 'static {
    /// Deliver one frame
    fn send(&mut self, frame: Bytes) -> impl Future<Output = io::Result<()>> + Send;

    /// Close the transport. Called exactly once, after the last `send`.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Raw byte stream subscriber (TCP)
#[derive(Debug)]
pub struct StreamSink<W> {
    writer: W,
}

impl<W> StreamSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap the write half of a connection
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W> SubscriberSink for StreamSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, frame: Bytes) -> io::Result<()> {
        self.writer.write_all(&frame).await?;
        self.writer.flush().await
    }

    async fn close(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            tracing::trace!(error = %e, "Stream shutdown failed");
        }
    }
}

/// Message-framed subscriber (WebSocket)
///
/// Each frame becomes one text message. Bytes that are not valid UTF-8 are
/// replaced, since text messages must be UTF-8.
#[derive(Debug)]
pub struct MessageSink<S> {
    sink: S,
}

impl<S> MessageSink<S>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    /// Wrap the sending half of a WebSocket
    pub fn new(sink: S) -> Self {
        Self { sink }
    }
}

impl<S> SubscriberSink for MessageSink<S>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    async fn send(&mut self, frame: Bytes) -> io::Result<()> {
        let text = String::from_utf8_lossy(&frame).into_owned();
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(io::Error::other)
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            tracing::trace!(error = %e, "WebSocket close failed");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory sink for registry and fan-out tests

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    /// Records every frame it is given on a channel
    pub(crate) struct RecordingSink {
        frames: mpsc::UnboundedSender<Bytes>,
        closes: Arc<AtomicUsize>,
        fail_on: Option<usize>,
        delay: Option<Duration>,
        sent: usize,
    }

    /// Test-side view of a [`RecordingSink`]
    pub(crate) struct SinkTap {
        pub(crate) frames: mpsc::UnboundedReceiver<Bytes>,
        closes: Arc<AtomicUsize>,
    }

    impl SinkTap {
        pub(crate) fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }

        pub(crate) async fn next(&mut self) -> Option<Bytes> {
            tokio::time::timeout(Duration::from_secs(2), self.frames.recv())
                .await
                .ok()
                .flatten()
        }
    }

    impl RecordingSink {
        pub(crate) fn new() -> (Self, SinkTap) {
            let (tx, rx) = mpsc::unbounded_channel();
            let closes = Arc::new(AtomicUsize::new(0));
            let sink = Self {
                frames: tx,
                closes: Arc::clone(&closes),
                fail_on: None,
                delay: None,
                sent: 0,
            };
            (sink, SinkTap { frames: rx, closes })
        }

        /// Fail the `n`th send (0-based)
        pub(crate) fn failing_on(mut self, n: usize) -> Self {
            self.fail_on = Some(n);
            self
        }

        /// Sleep before every send
        pub(crate) fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    impl SubscriberSink for RecordingSink {
        async fn send(&mut self, frame: Bytes) -> io::Result<()> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let n = self.sent;
            self.sent += 1;
            if self.fail_on == Some(n) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            let _ = self.frames.send(frame);
            Ok(())
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
