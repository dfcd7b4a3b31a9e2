//! Latency sink and its Prometheus implementation.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::time::Duration;

/// One measured round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencySample {
    /// Peer name from the snapshot
    pub peer: String,
    /// Peer address
    pub address: String,
    /// Measured round-trip time
    pub rtt: Duration,
    /// Set when the peer answered with a non-2xx status
    pub unhealthy_status: Option<u16>,
}

/// How a cycle ended, for the cycle counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleResult {
    Completed,
    ConfigError,
}

impl CycleResult {
    fn as_str(self) -> &'static str {
        match self {
            CycleResult::Completed => "completed",
            CycleResult::ConfigError => "config_error",
        }
    }
}

/// Receives probe results from the engine.
///
/// Recording is best-effort: implementations never fail and must be cheap,
/// since they are called from the probing path. Safe to call concurrently.
pub trait LatencySink: Send + Sync {
    /// Record one round-trip sample
    fn observe(&self, sample: &LatencySample);

    /// Count a probe that got no response
    fn record_unreachable(&self, _peer: &str, _address: &str) {}

    /// Count a finished cycle
    fn record_cycle(&self, _result: CycleResult, _peers_probed: usize) {}
}

/// Labels for per-peer metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PeerLabels {
    /// Peer name
    pub peer: String,
    /// Peer address
    pub ip: String,
}

/// Labels for probe failure metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FailureLabels {
    /// Peer name
    pub peer: String,
    /// Peer address
    pub ip: String,
    /// Failure kind (unreachable, unhealthy_status)
    pub kind: String,
}

/// Labels for cycle metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CycleLabels {
    /// Cycle result (completed, config_error)
    pub result: String,
}

/// Metrics registry with all meshprobe metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    /// Round-trip time per peer
    peer_latency_seconds: Family<PeerLabels, Histogram>,
    /// Probes without a usable answer
    probe_failures: Family<FailureLabels, Counter>,
    /// Cycles by result
    cycles: Family<CycleLabels, Counter>,
    /// Peers probed in the last completed cycle
    peers_probed: Gauge,
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let peer_latency_seconds = Family::<PeerLabels, Histogram>::new_with_constructor(|| {
            // 0.5ms to ~4s
            Histogram::new(exponential_buckets(0.0005, 2.0, 14))
        });
        registry.register(
            "meshprobe_peer_latency_seconds",
            "HTTP round-trip time to a peer in seconds",
            peer_latency_seconds.clone(),
        );

        let probe_failures = Family::<FailureLabels, Counter>::default();
        registry.register(
            "meshprobe_probe_failures",
            "Probes that were unreachable or answered with a non-success status",
            probe_failures.clone(),
        );

        let cycles = Family::<CycleLabels, Counter>::default();
        registry.register(
            "meshprobe_cycles",
            "Probing cycles by result",
            cycles.clone(),
        );

        let peers_probed = Gauge::default();
        registry.register(
            "meshprobe_peers_probed",
            "Peers probed in the last completed cycle",
            peers_probed.clone(),
        );

        Self {
            registry,
            peer_latency_seconds,
            probe_failures,
            cycles,
            peers_probed,
        }
    }

    /// Encode all metrics in the OpenMetrics text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }

    fn record_failure(&self, peer: &str, address: &str, kind: &str) {
        self.probe_failures
            .get_or_create(&FailureLabels {
                peer: peer.to_string(),
                ip: address.to_string(),
                kind: kind.to_string(),
            })
            .inc();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencySink for MetricsRegistry {
    fn observe(&self, sample: &LatencySample) {
        self.peer_latency_seconds
            .get_or_create(&PeerLabels {
                peer: sample.peer.clone(),
                ip: sample.address.clone(),
            })
            .observe(sample.rtt.as_secs_f64());

        if sample.unhealthy_status.is_some() {
            self.record_failure(&sample.peer, &sample.address, "unhealthy_status");
        }
    }

    fn record_unreachable(&self, peer: &str, address: &str) {
        self.record_failure(peer, address, "unreachable");
    }

    fn record_cycle(&self, result: CycleResult, peers_probed: usize) {
        self.cycles
            .get_or_create(&CycleLabels {
                result: result.as_str().to_string(),
            })
            .inc();

        if result == CycleResult::Completed {
            self.peers_probed.set(peers_probed as i64);
        }
    }
}
