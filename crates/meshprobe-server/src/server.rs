//! Process wiring: resolve, bind, spawn, wait for a signal, drain.

use crate::config::Config;
use crate::engine::ProbingEngine;
use crate::http_server::{self, MetricsServer, PingServer};
use crate::local_addrs::LocalAddrs;
use crate::metrics::MetricsRegistry;
use crate::snapshot::FileSnapshotSource;
use meshprobe::HttpProber;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The meshprobe daemon
pub struct MeshProbeServer {
    config: Config,
    registry: Arc<MetricsRegistry>,
}

impl MeshProbeServer {
    /// Create a new server
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: Arc::new(MetricsRegistry::new()),
        }
    }

    /// Shared metrics registry
    pub fn registry(&self) -> Arc<MetricsRegistry> {
        self.registry.clone()
    }

    /// Run until SIGINT/SIGTERM
    pub async fn run(self) -> common::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `signal` resolves.
    ///
    /// Local address resolution and listener binding happen before anything
    /// is spawned; a failure there is returned as a fatal error.
    pub async fn run_until<F>(self, signal: F) -> common::Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        info!("Starting meshprobe server");

        let local_addrs = LocalAddrs::resolve()?;
        info!(count = local_addrs.len(), "Local addresses resolved");

        let ping_listener = http_server::bind(&self.config.ping_listen_addr()).await?;
        let metrics_listener = http_server::bind(&self.config.metrics_listen_addr()).await?;

        let prober = HttpProber::new(self.config.probe.path.clone(), self.config.probe.timeout)
            .map_err(common::Error::other)?;
        let source = FileSnapshotSource::new(self.config.probe.config_file.clone());
        info!(path = %source.path().display(), "Endpoint snapshot source");

        let engine = ProbingEngine::new(
            Arc::new(source),
            Arc::new(prober),
            self.registry.clone(),
            local_addrs,
            self.config.probe.initial_interval,
        );

        let shutdown = CancellationToken::new();

        let request_timeout = self.config.server.request_timeout;
        let path = self.config.probe.path.clone();
        let ping_server = PingServer::new(path).with_request_timeout(request_timeout);
        let mut ping_handle = spawn_server(
            "liveness",
            ping_server.serve(ping_listener, shutdown.clone().cancelled_owned()),
        );

        let registry = self.registry.clone();
        let metrics_server = MetricsServer::new(registry).with_request_timeout(request_timeout);
        let mut metrics_handle = spawn_server(
            "metrics",
            metrics_server.serve(metrics_listener, shutdown.clone().cancelled_owned()),
        );

        let engine_handle = tokio::spawn(engine.run(shutdown.child_token()));

        info!("All tasks spawned, server running");

        let result = wait_for_shutdown(signal, &mut ping_handle, &mut metrics_handle).await;

        shutdown.cancel();

        let drain = async move {
            for handle in [ping_handle, metrics_handle, engine_handle] {
                // A handle that already completed in the select above must not be polled again
                if !handle.is_finished() {
                    let _ = handle.await;
                }
            }
        };
        if tokio::time::timeout(self.config.server.shutdown_timeout, drain)
            .await
            .is_err()
        {
            warn!(
                timeout = ?self.config.server.shutdown_timeout,
                "Timed out waiting for servers to drain"
            );
        }

        info!("meshprobe server stopped");
        result
    }
}

/// Wait for `signal`, or for a server task to end first.
///
/// Servers only return once shutdown has been requested, so an earlier exit
/// is a fatal error for the daemon.
async fn wait_for_shutdown<F>(
    signal: F,
    ping_handle: &mut JoinHandle<()>,
    metrics_handle: &mut JoinHandle<()>,
) -> common::Result<()>
where
    F: std::future::Future<Output = ()>,
{
    tokio::select! {
        _ = signal => {
            info!("Shutdown signal received");
            Ok(())
        }
        _ = ping_handle => {
            error!("Liveness server exited unexpectedly");
            Err(common::Error::server_exited("liveness"))
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
            Err(common::Error::server_exited("metrics"))
        }
    }
}

fn spawn_server<F>(name: &'static str, serve: F) -> JoinHandle<()>
where
    F: std::future::Future<Output = std::io::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = serve.await {
            error!(server = name, error = %e, "HTTP server error");
        }
    })
}

/// Resolves on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_exit_before_signal_is_fatal() {
        let mut ping_handle = tokio::spawn(async {});
        let mut metrics_handle = tokio::spawn(std::future::pending::<()>());
        let never = std::future::pending::<()>();

        let result = wait_for_shutdown(never, &mut ping_handle, &mut metrics_handle).await;

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "liveness server exited unexpectedly");
        metrics_handle.abort();
    }

    #[tokio::test]
    async fn test_signal_before_server_exit_is_clean() {
        let mut ping_handle = tokio::spawn(std::future::pending::<()>());
        let mut metrics_handle = tokio::spawn(std::future::pending::<()>());
        let signal = std::future::ready(());

        let result = wait_for_shutdown(signal, &mut ping_handle, &mut metrics_handle).await;

        assert!(result.is_ok());
        ping_handle.abort();
        metrics_handle.abort();
    }
}
