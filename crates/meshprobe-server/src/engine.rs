//! The probing engine: reload the snapshot, skip ourselves, probe every peer,
//! record the results, sleep, repeat.
//!
//! A cycle never fails. A snapshot that cannot be read or decoded makes the
//! cycle a no-op and keeps the previous polling period; a peer that cannot be
//! reached is counted and skipped while every other peer is still probed.

use crate::local_addrs::LocalAddrs;
use crate::metrics::{CycleResult, LatencySample, LatencySink};
use crate::snapshot::{SnapshotError, SnapshotSource};
use futures::future::join_all;
use meshprobe::{Endpoint, ProbeOutcome, Prober};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a single cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// No usable snapshot; nothing was probed
    Skipped { error: SnapshotError },

    /// Snapshot adopted and all eligible peers probed
    Completed(CycleSummary),
}

/// What happened to the peers of one completed cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Names of probed peers, in completion order
    pub probed: Vec<String>,
    /// Entries skipped because their address is ours
    pub skipped_local: usize,
    /// Probes answered with a 2xx status
    pub succeeded: usize,
    /// Probes answered with another status (latency still recorded)
    pub unhealthy: usize,
    /// Probes without a response (nothing recorded)
    pub unreachable: usize,
}

/// Periodic prober of every peer in the snapshot
pub struct ProbingEngine {
    source: Arc<dyn SnapshotSource>,
    prober: Arc<dyn Prober>,
    sink: Arc<dyn LatencySink>,
    local_addrs: LocalAddrs,
    interval: Duration,
}

impl ProbingEngine {
    /// Create an engine that sleeps `initial_interval` before its first cycle
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        prober: Arc<dyn Prober>,
        sink: Arc<dyn LatencySink>,
        local_addrs: LocalAddrs,
        initial_interval: Duration,
    ) -> Self {
        Self {
            source,
            prober,
            sink,
            local_addrs,
            interval: initial_interval,
        }
    }

    /// Sleep before the next cycle
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run cycles until `shutdown` is cancelled.
    ///
    /// Each iteration sleeps the current interval first, so a period adopted
    /// by one cycle governs the sleep that follows it.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            interval = ?self.interval,
            local_addrs = self.local_addrs.len(),
            prober = self.prober.name(),
            "Probing engine started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.cancelled() => break,
            }

            tokio::select! {
                _ = self.run_cycle() => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Probing engine stopped");
    }

    /// Run one load -> exclude -> probe -> record cycle, without sleeping
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let snapshot = match self.source.load().await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(
                    error = %error,
                    kind = error.kind(),
                    interval = ?self.interval,
                    "Failed to load endpoint snapshot, keeping previous interval"
                );
                self.sink.record_cycle(CycleResult::ConfigError, 0);
                return CycleOutcome::Skipped { error };
            }
        };

        if snapshot.polling_period != self.interval {
            info!(
                from = ?self.interval,
                to = ?snapshot.polling_period,
                "Adopting new polling period"
            );
        }
        self.interval = snapshot.polling_period;

        let mut summary = CycleSummary::default();
        let mut eligible: Vec<(String, Endpoint)> = Vec::with_capacity(snapshot.endpoints.len());
        for (name, endpoint) in snapshot.endpoints {
            if self.local_addrs.contains(&endpoint.ip) {
                summary.skipped_local += 1;
                continue;
            }
            eligible.push((name, endpoint));
        }

        let probes = eligible.iter().map(|(name, endpoint)| {
            let prober = &self.prober;
            async move {
                let outcome = prober.probe(endpoint).await;
                (name, endpoint, outcome)
            }
        });

        for (name, endpoint, outcome) in join_all(probes).await {
            self.record(name, endpoint, &outcome, &mut summary);
            summary.probed.push(name.clone());
        }

        debug!(
            probed = summary.probed.len(),
            skipped_local = summary.skipped_local,
            unhealthy = summary.unhealthy,
            unreachable = summary.unreachable,
            "Cycle completed"
        );
        self.sink
            .record_cycle(CycleResult::Completed, summary.probed.len());

        CycleOutcome::Completed(summary)
    }

    fn record(
        &self,
        name: &str,
        endpoint: &Endpoint,
        outcome: &ProbeOutcome,
        summary: &mut CycleSummary,
    ) {
        match outcome {
            ProbeOutcome::Success { rtt } => {
                info!(
                    peer = name,
                    ip = %endpoint.ip,
                    rtt_ms = rtt.as_secs_f64() * 1000.0,
                    "Peer round trip"
                );
                summary.succeeded += 1;
                self.sink.observe(&LatencySample {
                    peer: name.to_string(),
                    address: endpoint.ip.clone(),
                    rtt: *rtt,
                    unhealthy_status: None,
                });
            }
            ProbeOutcome::UnhealthyStatus { rtt, status } => {
                warn!(
                    peer = name,
                    ip = %endpoint.ip,
                    status = *status,
                    rtt_ms = rtt.as_secs_f64() * 1000.0,
                    "Peer answered with non-success status"
                );
                summary.unhealthy += 1;
                self.sink.observe(&LatencySample {
                    peer: name.to_string(),
                    address: endpoint.ip.clone(),
                    rtt: *rtt,
                    unhealthy_status: Some(*status),
                });
            }
            ProbeOutcome::Unreachable { cause } => {
                warn!(peer = name, endpoint = %endpoint, cause = %cause, "Peer unreachable");
                summary.unreachable += 1;
                self.sink.record_unreachable(name, &endpoint.ip);
            }
        }
    }
}

impl CycleOutcome {
    /// Summary of a completed cycle
    pub fn summary(&self) -> Option<&CycleSummary> {
        match self {
            CycleOutcome::Completed(summary) => Some(summary),
            CycleOutcome::Skipped { .. } => None,
        }
    }

    /// Whether the snapshot failed to load
    pub fn is_skipped(&self) -> bool {
        matches!(self, CycleOutcome::Skipped { .. })
    }
}
