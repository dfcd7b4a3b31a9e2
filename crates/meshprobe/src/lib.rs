//! Round-trip latency probing for a mesh of peer daemons.
//!
//! Every peer serves a small liveness path; this crate issues one HTTP GET
//! against it and reports what happened as a [`ProbeOutcome`]:
//! - `Success` with the measured round-trip time
//! - `UnhealthyStatus` when the peer answered with a non-2xx status
//! - `Unreachable` when no response arrived (refused, timeout, DNS)
//!
//! # Example
//!
//! ```no_run
//! use meshprobe::{Endpoint, HttpProber, Prober};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let prober = HttpProber::new("/ping", Duration::from_secs(10))?;
//! let outcome = prober.probe(&Endpoint::new("10.0.0.9", 8080)).await;
//!
//! if let Some(rtt) = outcome.rtt() {
//!     println!("round trip took {:?}", rtt);
//! }
//! # Ok(())
//! # }
//! ```

pub mod prober;
pub mod types;

pub use prober::{DEFAULT_PROBE_PATH, HttpProber, Prober};
pub use types::{Endpoint, ProbeOutcome};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_outcome_display() {
        let rtt = Duration::from_millis(2);
        let unhealthy = ProbeOutcome::UnhealthyStatus { rtt, status: 500 };
        let unreachable = ProbeOutcome::Unreachable {
            cause: "timeout".into(),
        };

        assert_eq!(ProbeOutcome::Success { rtt }.to_string(), "SUCCESS (2ms)");
        assert_eq!(unhealthy.to_string(), "UNHEALTHY status 500 (2ms)");
        assert_eq!(unreachable.to_string(), "UNREACHABLE (timeout)");
    }

    #[test]
    fn test_outcome_kind() {
        let rtt = Duration::from_millis(1);
        let success = ProbeOutcome::Success { rtt };
        let unhealthy = ProbeOutcome::UnhealthyStatus { rtt, status: 503 };
        let unreachable = ProbeOutcome::Unreachable {
            cause: String::new(),
        };

        assert!(success.is_success());
        assert!(!unhealthy.is_success());
        assert_eq!(success.kind(), "success");
        assert_eq!(unhealthy.kind(), "unhealthy_status");
        assert_eq!(unreachable.kind(), "unreachable");
    }
}
