//! Daemon settings: optional YAML file, environment overrides, validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Overrides the liveness responder port
pub const ENV_PING_PORT: &str = "HTTP_PORT";
/// Overrides the metrics exporter port
pub const ENV_METRICS_PORT: &str = "HTTP_PROMETHEUS_PORT";
/// Overrides the endpoint snapshot location
pub const ENV_SNAPSHOT_FILE: &str = "NET_PROBER_CONFIG_FILE";

/// Default location of the endpoint snapshot
pub const DEFAULT_SNAPSHOT_FILE: &str = "/etc/netprober/config.json";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid value {value:?} for environment variable {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub probe: ProbeSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.server.validate()?;
        self.probe.validate()?;
        Ok(())
    }
}

/// Listener settings for the liveness and metrics servers
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_distinct_ports"))]
pub struct ServerSettings {
    #[validate(length(min = 1))]
    pub bind_address: String,

    #[validate(range(min = 1))]
    pub ping_port: u16,

    #[validate(range(min = 1))]
    pub metrics_port: u16,

    /// Time allowed for in-flight requests to drain on shutdown
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_shutdown_timeout")]
    pub shutdown_timeout: Duration,

    /// Bound on reading a request's headers and on answering it
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_request_timeout")]
    pub request_timeout: Duration,
}

/// Probing engine settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProbeSettings {
    /// Endpoint snapshot, re-read every cycle
    pub config_file: PathBuf,

    /// Sleep before the first cycle, until a snapshot supplies its own period
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_positive_interval")]
    pub initial_interval: Duration,

    /// Upper bound on a single probe
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_probe_timeout")]
    pub timeout: Duration,

    /// Liveness path, served locally and requested on peers
    #[validate(custom = "validate_path")]
    pub path: String,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl LoggingSettings {
    /// Whether JSON output was requested
    pub fn is_json(&self) -> bool {
        self.format
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case("json"))
    }
}

/// OTLP transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    Http,
}

/// OpenTelemetry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    pub service_name: String,
    pub otlp_endpoint: String,
    pub protocol: OtlpProtocol,
}

// Default implementations

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            ping_port: 8080,
            metrics_port: 2112,
            shutdown_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from(DEFAULT_SNAPSHOT_FILE),
            initial_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(10),
            path: meshprobe::DEFAULT_PROBE_PATH.to_string(),
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "meshprobe".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
            protocol: OtlpProtocol::Grpc,
        }
    }
}

// Custom validators

fn validate_distinct_ports(server: &ServerSettings) -> Result<(), ValidationError> {
    if server.ping_port == server.metrics_port {
        return Err(ValidationError::new("ports_must_differ"));
    }
    Ok(())
}

fn validate_shutdown_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    if timeout.is_zero() || *timeout > Duration::from_secs(300) {
        return Err(ValidationError::new("shutdown_timeout_out_of_range"));
    }
    Ok(())
}

fn validate_request_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    if timeout.as_millis() < 1 || *timeout > Duration::from_secs(300) {
        return Err(ValidationError::new("request_timeout_out_of_range"));
    }
    Ok(())
}

fn validate_positive_interval(interval: &Duration) -> Result<(), ValidationError> {
    if interval.is_zero() {
        return Err(ValidationError::new("interval_must_be_positive"));
    }
    Ok(())
}

fn validate_probe_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    if timeout.as_millis() < 1 || *timeout > Duration::from_secs(300) {
        return Err(ValidationError::new("probe_timeout_out_of_range"));
    }
    Ok(())
}

fn validate_path(path: &str) -> Result<(), ValidationError> {
    if !path.starts_with('/') {
        return Err(ValidationError::new("path_must_be_absolute"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load the settings file from the default search paths (if any), then
    /// apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };
        config.with_env(|var| std::env::var(var).ok())
    }

    /// Defaults plus environment overrides, ignoring any settings file
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env(|var| std::env::var(var).ok())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HTTP_PORT`, `HTTP_PROMETHEUS_PORT` and `NET_PROBER_CONFIG_FILE`
    /// as resolved by `lookup`, then re-validate.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = non_empty(lookup(ENV_PING_PORT)) {
            self.server.ping_port = parse_port(ENV_PING_PORT, port)?;
        }
        if let Some(port) = non_empty(lookup(ENV_METRICS_PORT)) {
            self.server.metrics_port = parse_port(ENV_METRICS_PORT, port)?;
        }
        if let Some(path) = non_empty(lookup(ENV_SNAPSHOT_FILE)) {
            self.probe.config_file = PathBuf::from(path);
        }

        self.validate()?;
        Ok(self)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/netprober/meshprobe.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./meshprobe.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/netprober/meshprobe.yaml"))
    }

    /// Liveness listener address
    pub fn ping_listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.ping_port)
    }

    /// Metrics listener address
    pub fn metrics_listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.metrics_port)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_port(var: &'static str, value: String) -> Result<u16, ConfigError> {
    match value.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::InvalidEnv { var, value }),
    }
}
