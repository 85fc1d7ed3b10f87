//! End-to-end tests over real sockets
//!
//! The upstream is a local TCP listener standing in for the serial port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serial_bridge::{
    AdmissionController, AdmissionPolicy, BackoffPolicy, Bridge, BridgeConfig, Error,
    ReconnectPolicy, SubscriberRegistry, TcpDevice, TransportKind,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    stream_addr: SocketAddr,
    message_addr: SocketAddr,
    upstream: TcpListener,
    device: String,
    registry: Arc<SubscriberRegistry>,
    admission: AdmissionController,
    stop: oneshot::Sender<()>,
    task: JoinHandle<serial_bridge::Result<()>>,
}

fn local() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn test_config() -> BridgeConfig {
    BridgeConfig::default()
        .stream_addr(local())
        .message_addr(local())
        .stats_interval(Duration::ZERO)
        .reconnect(
            ReconnectPolicy::default()
                .open_backoff(BackoffPolicy::fixed(Duration::from_millis(10)))
                .reopen_delay(Duration::from_millis(10)),
        )
}

async fn start(config: BridgeConfig) -> Harness {
    let upstream = TcpListener::bind(local()).await.unwrap();
    let upstream_addr = upstream.local_addr().unwrap();

    let bridge = Bridge::bind(config).await.unwrap();
    let stream_addr = bridge.stream_addr();
    let message_addr = bridge.message_addr();
    let registry = Arc::clone(bridge.registry());
    let admission = bridge.admission().clone();

    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(bridge.run_until(
        TcpDevice::new(upstream_addr.to_string()),
        async move {
            let _ = stopped.await;
        },
    ));

    Harness {
        stream_addr,
        message_addr,
        upstream,
        device: format!("tcp://{}", upstream_addr),
        registry,
        admission,
        stop,
        task,
    }
}

async fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    tokio::time::timeout(TIMEOUT, reader.read_line(&mut line))
        .await
        .expect("timed out waiting for a line")
        .unwrap();
    line
}

async fn wait_for_subscribers(registry: &SubscriberRegistry, expected: usize) {
    for _ in 0..500 {
        if registry.total().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} subscribers", expected);
}

async fn next_text<S>(ws: &mut S) -> String
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("websocket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return text.to_string();
        }
    }
}

fn assert_timestamped(frame: &str, payload: &str) {
    let (ts, rest) = frame.split_once('\t').expect("missing tab");
    assert_eq!(ts.len(), 14, "bad timestamp in {:?}", frame);
    assert!(ts.bytes().all(|b| b.is_ascii_digit()));
    assert_eq!(rest, payload);
}

#[tokio::test]
async fn test_record_reaches_tcp_and_websocket_subscribers() {
    let harness = start(test_config()).await;

    let tcp = TcpStream::connect(harness.stream_addr).await.unwrap();
    let mut tcp = BufReader::new(tcp);
    assert_eq!(
        read_line(&mut tcp).await,
        format!("Connected to {}. Waiting for data...\n", harness.device)
    );

    let url = format!("ws://{}/ws", harness.message_addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    assert_eq!(
        next_text(&mut ws).await,
        format!("Connected to {}. Waiting for data...", harness.device)
    );

    wait_for_subscribers(&harness.registry, 2).await;
    assert_eq!(harness.registry.count(TransportKind::Stream).await, 1);
    assert_eq!(harness.registry.count(TransportKind::Message).await, 1);

    let (mut upstream, _) = harness.upstream.accept().await.unwrap();
    upstream.write_all(b"P:1013.2 T1:21.4\r\n").await.unwrap();

    let line = read_line(&mut tcp).await;
    assert_timestamped(&line, "P:1013.2 T1:21.4\r\n");

    let text = next_text(&mut ws).await;
    assert_timestamped(&text, "P:1013.2 T1:21.4\r");

    harness.stop.send(()).unwrap();
    harness.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_connection_over_limit_is_closed_without_data() {
    let harness = start(test_config().max_connections(1)).await;

    let first = TcpStream::connect(harness.stream_addr).await.unwrap();
    let mut first = BufReader::new(first);
    assert!(read_line(&mut first).await.starts_with("Connected to"));
    assert_eq!(harness.admission.capacity(), 1);
    assert_eq!(harness.admission.outstanding(), 1);

    let mut second = TcpStream::connect(harness.stream_addr).await.unwrap();
    let mut buf = Vec::new();
    let _ = tokio::time::timeout(TIMEOUT, second.read_to_end(&mut buf))
        .await
        .expect("refused connection was not closed");
    assert!(buf.is_empty());

    // WebSocket clients do not count against the limit by default
    let url = format!("ws://{}/ws", harness.message_addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    assert!(next_text(&mut ws).await.starts_with("Connected to"));

    wait_for_subscribers(&harness.registry, 2).await;
    assert_eq!(harness.admission.outstanding(), 1);
    let metrics = harness.registry.metrics().snapshot();
    assert_eq!(metrics.connections_rejected, 1);

    harness.stop.send(()).unwrap();
    harness.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shared_limit_refuses_websocket() {
    let config = test_config()
        .max_connections(1)
        .admission_policy(AdmissionPolicy::Shared);
    let harness = start(config).await;

    let tcp = TcpStream::connect(harness.stream_addr).await.unwrap();
    let mut tcp = BufReader::new(tcp);
    read_line(&mut tcp).await;

    let url = format!("ws://{}/ws", harness.message_addr);
    match tokio_tungstenite::connect_async(url).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 503);
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("upgrade should have been refused"),
    }

    harness.stop.send(()).unwrap();
    harness.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_freed_slot_admits_next_connection() {
    let harness = start(test_config().max_connections(1)).await;

    let first = TcpStream::connect(harness.stream_addr).await.unwrap();
    let mut first = BufReader::new(first);
    read_line(&mut first).await;
    wait_for_subscribers(&harness.registry, 1).await;

    drop(first);
    wait_for_subscribers(&harness.registry, 0).await;

    let mut admitted = false;
    for _ in 0..100 {
        let stream = TcpStream::connect(harness.stream_addr).await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        let n = tokio::time::timeout(TIMEOUT, reader.read_line(&mut line))
            .await
            .unwrap()
            .unwrap_or(0);
        if n > 0 && line.starts_with("Connected to") {
            admitted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(admitted);

    harness.stop.send(()).unwrap();
    harness.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_upstream_is_reopened() {
    let harness = start(test_config()).await;

    let tcp = TcpStream::connect(harness.stream_addr).await.unwrap();
    let mut tcp = BufReader::new(tcp);
    read_line(&mut tcp).await;
    wait_for_subscribers(&harness.registry, 1).await;

    let (mut upstream, _) = harness.upstream.accept().await.unwrap();
    upstream.write_all(b"first\n").await.unwrap();
    assert_timestamped(&read_line(&mut tcp).await, "first\n");
    drop(upstream);

    let (mut upstream, _) = tokio::time::timeout(TIMEOUT, harness.upstream.accept())
        .await
        .unwrap()
        .unwrap();
    upstream.write_all(b"second\n").await.unwrap();
    assert_timestamped(&read_line(&mut tcp).await, "second\n");

    assert_eq!(harness.registry.metrics().snapshot().upstream_opens, 2);

    harness.stop.send(()).unwrap();
    harness.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_every_subscriber() {
    let harness = start(test_config()).await;

    let tcp = TcpStream::connect(harness.stream_addr).await.unwrap();
    let mut tcp = BufReader::new(tcp);
    read_line(&mut tcp).await;

    let url = format!("ws://{}/ws", harness.message_addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    next_text(&mut ws).await;
    wait_for_subscribers(&harness.registry, 2).await;

    harness.stop.send(()).unwrap();
    tokio::time::timeout(TIMEOUT, harness.task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let mut rest = Vec::new();
    tokio::time::timeout(TIMEOUT, tcp.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());

    let closed = tokio::time::timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    assert_eq!(harness.registry.total().await, 0);
    assert_eq!(harness.registry.metrics().snapshot().subscribers_removed, 2);
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let taken = TcpListener::bind(local()).await.unwrap();
    let addr = taken.local_addr().unwrap();

    match Bridge::bind(test_config().stream_addr(addr)).await {
        Err(Error::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("bind should fail"),
    }
}
