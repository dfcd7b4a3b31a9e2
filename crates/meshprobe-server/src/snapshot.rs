//! Endpoint snapshot loading.
//!
//! The snapshot is a JSON document with the peer set and the polling period:
//!
//! ```json
//! {
//!   "endpointsMap": {
//!     "pod-a": { "ip": "10.0.0.5", "port": "8080" },
//!     "pod-b": { "ip": "10.0.0.9", "port": "8080" }
//!   },
//!   "pollingPeriod": 30000000000
//! }
//! ```
//!
//! `pollingPeriod` is either integer nanoseconds or a humantime string
//! (`"30s"`). A snapshot is returned whole or not at all.

use async_trait::async_trait;
use humantime_serde::re::humantime;
use meshprobe::Endpoint;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Snapshot loading errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode snapshot: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to parse polling period {value:?}: {source}")]
    PeriodSyntax {
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("Invalid polling period {0:?}: must be greater than zero")]
    InvalidPollingPeriod(String),
}

impl SnapshotError {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SnapshotError::Read { .. } => "read",
            SnapshotError::Decode(_) | SnapshotError::PeriodSyntax { .. } => "decode",
            SnapshotError::InvalidPollingPeriod(_) => "invalid_period",
        }
    }
}

/// Peer set and polling period decoded in one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Peer name -> endpoint
    pub endpoints: HashMap<String, Endpoint>,

    /// Sleep before the following cycle, always > 0
    pub polling_period: Duration,
}

impl Snapshot {
    /// Decode and validate a snapshot document
    pub fn from_json(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let raw: RawSnapshot = serde_json::from_slice(bytes)?;
        Ok(Self {
            endpoints: raw.endpoints_map,
            polling_period: raw.polling_period.into_duration()?,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    endpoints_map: HashMap<String, Endpoint>,
    polling_period: RawPeriod,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPeriod {
    Nanos(i64),
    Text(String),
}

impl RawPeriod {
    fn into_duration(self) -> Result<Duration, SnapshotError> {
        match self {
            RawPeriod::Nanos(nanos) if nanos > 0 => Ok(Duration::from_nanos(nanos as u64)),
            RawPeriod::Nanos(nanos) => {
                Err(SnapshotError::InvalidPollingPeriod(format!("{}ns", nanos)))
            }
            RawPeriod::Text(text) => {
                let trimmed = text.trim();
                if trimmed.starts_with('-') {
                    return Err(SnapshotError::InvalidPollingPeriod(text));
                }
                match humantime::parse_duration(trimmed) {
                    Ok(period) if !period.is_zero() => Ok(period),
                    Ok(_) => Err(SnapshotError::InvalidPollingPeriod(text)),
                    Err(source) => Err(SnapshotError::PeriodSyntax {
                        value: text,
                        source,
                    }),
                }
            }
        }
    }
}

/// Where snapshots come from
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Read and decode the current snapshot. No retries.
    async fn load(&self) -> Result<Snapshot, SnapshotError>;
}

/// Snapshot stored in a file, re-read in full on every load
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    /// Create a source reading `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path read on each load
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshotSource {
    async fn load(&self) -> Result<Snapshot, SnapshotError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SnapshotError::Read {
                path: self.path.clone(),
                source,
            })?;
        Snapshot::from_json(&bytes)
    }
}
