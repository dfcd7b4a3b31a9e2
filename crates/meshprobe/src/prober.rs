//! Probe implementations.

use crate::types::{Endpoint, ProbeOutcome};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default liveness path served by every peer
pub const DEFAULT_PROBE_PATH: &str = "/ping";

/// Measures one round trip to a peer
#[async_trait]
pub trait Prober: Send + Sync {
    /// Issue a single probe. Never retries.
    async fn probe(&self, endpoint: &Endpoint) -> ProbeOutcome;

    /// Get the name of this prober
    fn name(&self) -> &str;
}

/// HTTP GET prober
pub struct HttpProber {
    path: String,
    client: reqwest::Client,
}

impl HttpProber {
    /// Create a prober that GETs `path` on each peer.
    ///
    /// `timeout` bounds the whole request so a hung peer cannot stall a cycle.
    pub fn new(path: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            path: path.into(),
            client,
        })
    }

    /// Path requested on each peer
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, endpoint: &Endpoint) -> ProbeOutcome {
        let url = endpoint.url(&self.path);

        let start = Instant::now();
        let response = self.client.get(&url).send().await;
        let rtt = start.elapsed();

        match response {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    debug!(
                        url = %url,
                        status = status.as_u16(),
                        rtt_ms = rtt.as_millis(),
                        "Probe successful"
                    );
                    ProbeOutcome::Success { rtt }
                } else {
                    debug!(
                        url = %url,
                        status = status.as_u16(),
                        "Probe answered with unexpected status"
                    );
                    ProbeOutcome::UnhealthyStatus {
                        rtt,
                        status: status.as_u16(),
                    }
                }
            }
            Err(e) => {
                let cause = classify(&e);
                debug!(url = %url, cause = cause, error = %e, "Probe failed");
                ProbeOutcome::Unreachable {
                    cause: format!("{}: {}", cause, e),
                }
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn classify(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else {
        "request"
    }
}
