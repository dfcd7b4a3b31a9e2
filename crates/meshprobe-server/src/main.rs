//! meshprobe server binary

use meshprobe_server::{Config, MeshProbeServer, setup_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first (needed for logging settings)
    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e @ meshprobe_server::ConfigError::InvalidEnv { .. }) => return Err(e.into()),
        Err(e) => {
            // Can't use tracing yet - not initialized
            eprintln!("Configuration error: {}", e);
            eprintln!("Using default configuration");
            Config::from_env()?
        }
    };

    // Keep alive until exit so pending spans are flushed
    let _telemetry_guard = setup_tracing(&config.logging, &config.telemetry)?;

    tracing::info!(
        ping_addr = %config.ping_listen_addr(),
        metrics_addr = %config.metrics_listen_addr(),
        snapshot = %config.probe.config_file.display(),
        "meshprobe starting"
    );

    let server = MeshProbeServer::new(config);
    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "meshprobe failed");
        return Err(e.into());
    }

    Ok(())
}
