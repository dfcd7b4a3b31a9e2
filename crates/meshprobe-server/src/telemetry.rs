//! Tracing subscriber setup, with optional OpenTelemetry span export.

use crate::config::{LoggingSettings, OtlpProtocol, TelemetrySettings};
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// OpenTelemetry tracer guard
///
/// When dropped, flushes all pending spans and shuts down the tracer
pub struct TelemetryGuard;

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

/// Build the OTLP tracer provider and install it globally.
///
/// Returns `None` when telemetry is disabled. Must be called from within a
/// tokio runtime (the batch exporter runs on it).
pub fn init_tracer_provider(
    settings: &TelemetrySettings,
) -> Result<Option<TracerProvider>, Box<dyn std::error::Error>> {
    if !settings.enabled {
        return Ok(None);
    }

    let exporter = match settings.protocol {
        OtlpProtocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&settings.otlp_endpoint)
            .build()?,
        OtlpProtocol::Http => opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(&settings.otlp_endpoint)
            .build()?,
    };

    let resource = Resource::new(vec![
        KeyValue::new("service.name", settings.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_string()),
    ]);

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());

    Ok(Some(provider))
}

/// Install the global subscriber.
///
/// Without telemetry this is plain (or JSON) stdout logging; with telemetry
/// an OpenTelemetry layer is stacked on top. Keep the returned guard alive
/// for the lifetime of the process.
pub fn setup_tracing(
    logging: &LoggingSettings,
    telemetry: &TelemetrySettings,
) -> Result<Option<TelemetryGuard>, Box<dyn std::error::Error>> {
    let level = logging.level.as_deref().unwrap_or("info");

    let Some(provider) = init_tracer_provider(telemetry)? else {
        if logging.is_json() {
            common::logging::init_json(level);
        } else {
            common::logging::init(level);
        }
        tracing::info!("Tracing initialized without OpenTelemetry");
        return Ok(None);
    };

    let otel_layer = tracing_opentelemetry::layer().with_tracer(provider.tracer("meshprobe"));
    let json = logging.is_json();

    tracing_subscriber::registry()
        .with(common::logging::env_filter(level))
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .with(otel_layer)
        .init();

    tracing::info!(
        service_name = %telemetry.service_name,
        otlp_endpoint = %telemetry.otlp_endpoint,
        protocol = ?telemetry.protocol,
        "Tracing initialized with OpenTelemetry integration"
    );

    Ok(Some(TelemetryGuard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_telemetry_disabled() {
        let settings = TelemetrySettings::default();
        let result = init_tracer_provider(&settings);
        assert!(result.is_ok());
        assert!(result.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_telemetry_http_disabled() {
        let settings = TelemetrySettings {
            protocol: OtlpProtocol::Http,
            otlp_endpoint: "http://localhost:4318/v1/traces".to_string(),
            ..TelemetrySettings::default()
        };
        assert!(init_tracer_provider(&settings).unwrap().is_none());
    }
}
