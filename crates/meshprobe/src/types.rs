//! Probe types and structures.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

/// A peer to probe: an IPv4 address and a TCP port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Peer address, compared by value for self-exclusion
    pub ip: String,

    /// Peer port (accepts `"8080"` or `8080` on input)
    #[serde(deserialize_with = "deserialize_port")]
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// URL of `path` on this endpoint
    pub fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.ip, self.port, path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u16),
        Text(String),
    }

    match PortRepr::deserialize(deserializer)? {
        PortRepr::Number(port) => Ok(port),
        PortRepr::Text(text) => match text.trim().parse::<u16>() {
            Ok(port) => Ok(port),
            Err(e) => {
                let msg = format!("invalid port {:?}: {}", text, e);
                Err(serde::de::Error::custom(msg))
            }
        },
    }
}

/// Outcome of a single probe.
///
/// `Unreachable` means no response arrived at all; `UnhealthyStatus` means the
/// round trip completed but the peer answered with a non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Peer answered with a 2xx status
    Success { rtt: Duration },

    /// Transport-level failure (refused, timed out, name resolution, ...)
    Unreachable { cause: String },

    /// Peer answered, but with a non-success status
    UnhealthyStatus { rtt: Duration, status: u16 },
}

impl ProbeOutcome {
    /// Measured round-trip time, if a response arrived
    pub fn rtt(&self) -> Option<Duration> {
        match self {
            ProbeOutcome::Success { rtt } | ProbeOutcome::UnhealthyStatus { rtt, .. } => Some(*rtt),
            ProbeOutcome::Unreachable { .. } => None,
        }
    }

    /// Check if the outcome is a healthy response
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeOutcome::Success { .. } => "success",
            ProbeOutcome::Unreachable { .. } => "unreachable",
            ProbeOutcome::UnhealthyStatus { .. } => "unhealthy_status",
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Success { rtt } => write!(f, "SUCCESS ({:?})", rtt),
            ProbeOutcome::Unreachable { cause } => write!(f, "UNREACHABLE ({})", cause),
            ProbeOutcome::UnhealthyStatus { rtt, status } => {
                write!(f, "UNHEALTHY status {} ({:?})", status, rtt)
            }
        }
    }
}
