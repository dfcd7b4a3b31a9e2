//! Integration tests for the liveness and metrics HTTP servers

use meshprobe::{Endpoint, HttpProber, Prober};
use meshprobe_server::http_server::{self, PONG_BODY};
use meshprobe_server::{LatencySample, LatencySink, MetricsRegistry, MetricsServer, PingServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type ServerHandle = JoinHandle<std::io::Result<()>>;

async fn start_ping_server(
    server: PingServer,
    shutdown: &CancellationToken,
) -> (SocketAddr, ServerHandle) {
    let listener = http_server::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(server.serve(listener, shutdown.clone().cancelled_owned()));
    (addr, handle)
}

#[tokio::test]
async fn test_ping_server_answers_pong() {
    let shutdown = CancellationToken::new();
    let (addr, handle) = start_ping_server(PingServer::new("/ping"), &shutdown).await;

    let url = format!("http://{}/ping", addr);
    let response = reqwest::get(url).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), PONG_BODY);

    let url = format!("http://{}/other", addr);
    let response = reqwest::get(url).await.unwrap();
    assert_eq!(response.status(), 404);

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_prober_against_ping_server() {
    let shutdown = CancellationToken::new();
    let (addr, _handle) = start_ping_server(PingServer::new("/ping"), &shutdown).await;

    let prober = HttpProber::new("/ping", Duration::from_secs(2)).unwrap();
    let peer = Endpoint::new(addr.ip().to_string(), addr.port());
    let outcome = prober.probe(&peer).await;

    assert!(outcome.is_success(), "unexpected outcome: {}", outcome);
    shutdown.cancel();
}

#[tokio::test]
async fn test_metrics_server_exposes_latency() {
    let registry = Arc::new(MetricsRegistry::new());
    registry.observe(&LatencySample {
        peer: "peerB".to_string(),
        address: "10.0.0.9".to_string(),
        rtt: Duration::from_millis(8),
        unhealthy_status: None,
    });

    let shutdown = CancellationToken::new();
    let listener = http_server::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = MetricsServer::new(registry.clone());
    let handle = tokio::spawn(server.serve(listener, shutdown.clone().cancelled_owned()));

    let url = format!("http://{}/metrics", addr);
    let response = reqwest::get(url).await.unwrap();
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("meshprobe_peer_latency_seconds"));
    assert!(body.contains(r#"peer="peerB",ip="10.0.0.9""#));

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server should drain")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_stalled_request_headers_are_disconnected() {
    let shutdown = CancellationToken::new();
    let server = PingServer::new("/ping").with_request_timeout(Duration::from_millis(200));
    let (addr, handle) = start_ping_server(server, &shutdown).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GET /ping HTTP/1.1\r\n").await.unwrap();

    // The server must close the connection without ever answering
    let mut received = Vec::new();
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        let mut buf = [0u8; 256];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => received.extend_from_slice(&buf[..n]),
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "stalled connection was left open");
    assert!(!String::from_utf8_lossy(&received).contains("pong"));

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server should drain")
        .unwrap()
        .unwrap();
}
