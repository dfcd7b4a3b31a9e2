//! Integration tests for HttpProber against a local HTTP server

use axum::{Router, http::StatusCode, routing::get};
use meshprobe::{Endpoint, HttpProber, ProbeOutcome, Prober};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    layer::{Context, Layer, SubscriberExt},
    util::SubscriberInitExt,
};

/// Layer that records the target and level of every event
#[derive(Clone, Default)]
struct EventLevels(Arc<Mutex<Vec<(String, Level)>>>);

impl<S: Subscriber> Layer<S> for EventLevels {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        self.0
            .lock()
            .unwrap()
            .push((meta.target().to_string(), *meta.level()));
    }
}

/// Helper to start a peer with a healthy and an unhealthy path
async fn spawn_peer() -> Endpoint {
    let app = Router::new()
        .route("/ping", get(|| async { "pong\n" }))
        .route(
            "/broken",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Endpoint::new(addr.ip().to_string(), addr.port())
}

#[tokio::test]
async fn test_probe_success_measures_rtt() {
    let peer = spawn_peer().await;
    let prober = HttpProber::new("/ping", Duration::from_secs(2)).unwrap();

    let outcome = prober.probe(&peer).await;

    assert!(outcome.is_success(), "unexpected outcome: {}", outcome);
    assert!(outcome.rtt().unwrap() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_probe_unhealthy_status_keeps_rtt() {
    let peer = spawn_peer().await;
    let prober = HttpProber::new("/broken", Duration::from_secs(2)).unwrap();

    match prober.probe(&peer).await {
        ProbeOutcome::UnhealthyStatus { status, .. } => assert_eq!(status, 503),
        other => panic!("Expected UnhealthyStatus, got {:?}", other),
    }
}

#[tokio::test]
async fn test_probe_unknown_path_is_unhealthy() {
    let peer = spawn_peer().await;
    let prober = HttpProber::new("/missing", Duration::from_secs(2)).unwrap();

    let outcome = prober.probe(&peer).await;
    assert_eq!(outcome.kind(), "unhealthy_status");
}

#[tokio::test]
async fn test_probe_timeout_is_unreachable() {
    let peer = spawn_peer().await;
    let prober = HttpProber::new("/slow", Duration::from_millis(200)).unwrap();

    match prober.probe(&peer).await {
        ProbeOutcome::Unreachable { cause } => {
            assert!(cause.starts_with("timeout"), "{}", cause)
        }
        other => panic!("Expected Unreachable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_probes_log_below_warn() {
    let levels = EventLevels::default();
    let _guard = tracing_subscriber::registry()
        .with(levels.clone())
        .set_default();

    let peer = spawn_peer().await;
    let unhealthy = HttpProber::new("/broken", Duration::from_secs(2)).unwrap();
    assert_eq!(unhealthy.probe(&peer).await.kind(), "unhealthy_status");

    // Nothing listens on port 1
    let unreachable = HttpProber::new("/ping", Duration::from_millis(500)).unwrap();
    let closed = Endpoint::new("127.0.0.1", 1);
    assert_eq!(unreachable.probe(&closed).await.kind(), "unreachable");

    let events = levels.0.lock().unwrap();
    let prober_events: Vec<_> = events
        .iter()
        .filter(|(target, _)| target.starts_with("meshprobe"))
        .collect();
    assert_eq!(prober_events.len(), 2, "{:?}", prober_events);
    let all_debug = prober_events.iter().all(|(_, l)| *l == Level::DEBUG);
    assert!(all_debug, "{:?}", prober_events);
}
