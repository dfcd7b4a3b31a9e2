//! meshprobe server - per-node mesh latency prober
//!
//! Each replica probes every other replica listed in a shared endpoint
//! snapshot, exports the round-trip times as Prometheus histograms and
//! answers the same probes for its peers.
//!
//! # Components
//!
//! - **Engine**: reload the snapshot, skip local addresses, probe, record
//! - **Snapshot**: decodes the endpoint set and polling period every cycle
//! - **Local addresses**: resolved once at startup for self-exclusion
//! - **Metrics**: the latency sink backed by `prometheus-client`
//! - **HTTP servers**: liveness responder and `/metrics` exporter

pub mod config;
pub mod engine;
pub mod http_server;
pub mod local_addrs;
pub mod metrics;
pub mod server;
pub mod snapshot;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use engine::{CycleOutcome, CycleSummary, ProbingEngine};
pub use http_server::{MetricsServer, PingServer};
pub use local_addrs::LocalAddrs;
pub use metrics::{LatencySample, LatencySink, MetricsRegistry};
pub use server::MeshProbeServer;
pub use snapshot::{FileSnapshotSource, Snapshot, SnapshotError, SnapshotSource};
pub use telemetry::{TelemetryGuard, setup_tracing};
