//! HTTP servers: the liveness responder peers probe, and the Prometheus
//! metrics endpoint.

use crate::metrics::MetricsRegistry;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

/// Body returned by the liveness responder
pub const PONG_BODY: &str = "pong\n";

/// Default bound on reading request headers and on answering a request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Content type of the metrics exposition
const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Bind a listener, mapping failures to the fatal bind error
pub async fn bind(addr: &str) -> common::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| common::Error::bind(addr, e))
}

/// Serve `router` over HTTP/1.1 until `shutdown` resolves.
///
/// A connection that has not delivered complete headers within
/// `request_timeout` is closed. After `shutdown`, no new connections are
/// accepted and open ones are asked to finish their current request.
async fn serve_router<F>(
    listener: TcpListener,
    router: Router,
    request_timeout: Duration,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let graceful = GracefulShutdown::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = accepted?;
                let service = TowerToHyperService::new(router.clone());
                let conn = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .header_read_timeout(request_timeout)
                    .serve_connection(TokioIo::new(stream), service);
                let conn = graceful.watch(conn);

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        debug!(%peer_addr, error = %e, "Connection closed with error");
                    }
                });
            }
            _ = &mut shutdown => break,
        }
    }

    drop(listener);
    graceful.shutdown().await;
    Ok(())
}

/// Liveness responder answering peers' probes
pub struct PingServer {
    /// Path answered with `pong`
    path: String,
    request_timeout: Duration,
}

impl PingServer {
    /// Create a new liveness responder
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build the router
    pub fn router(&self) -> Router {
        Router::new().route(&self.path, get(ping_handler)).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(self.request_timeout)),
        )
    }

    /// Serve on `listener` until `shutdown` resolves, then drain
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(
            addr = ?listener.local_addr().ok(),
            path = %self.path,
            "Liveness server listening"
        );
        serve_router(listener, self.router(), self.request_timeout, shutdown).await?;
        info!("Liveness server stopped");
        Ok(())
    }
}

/// HTTP server for metrics endpoint
pub struct MetricsServer {
    /// Metrics registry
    registry: Arc<MetricsRegistry>,
    request_timeout: Duration,
}

impl MetricsServer {
    /// Create a new metrics server
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self {
            registry,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build the router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(self.request_timeout)),
            )
            .with_state(self.registry.clone())
    }

    /// Serve on `listener` until `shutdown` resolves, then drain
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = ?listener.local_addr().ok(), "Metrics server listening");
        serve_router(listener, self.router(), self.request_timeout, shutdown).await?;
        info!("Metrics server stopped");
        Ok(())
    }
}

/// Handler for the liveness path
async fn ping_handler() -> &'static str {
    debug!("Ping request");
    PONG_BODY
}

/// Handler for /metrics endpoint
async fn metrics_handler(State(registry): State<Arc<MetricsRegistry>>) -> Response {
    match registry.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", OPENMETRICS_CONTENT_TYPE)],
            buffer,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}
