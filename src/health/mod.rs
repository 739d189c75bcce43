//! Agent health scoring and the recovery verdict.

pub mod metrics;
pub mod monitor;
pub mod satisfaction;

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::storage::StoreError;

pub use metrics::{inactivity_penalty, score, HealthInputs, HealthMetrics};
pub use monitor::HealthMonitor;
pub use satisfaction::{
    InMemorySatisfactionFeed, JsonlSatisfactionFeed, SatisfactionFeed, SatisfactionSample,
};

#[cfg(any(test, feature = "testing"))]
pub use satisfaction::MockSatisfactionFeed;

pub const HEALTHY_REASON: &str = "Agent is healthy";

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("Log store error: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of a recovery check. `Display` gives the human-readable reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum RecoveryNeed {
    Healthy { score: f64 },
    ArtifactMissing { path: PathBuf },
    /// Too many recoveries in the trailing window; needs a human
    RepeatedFailure { attempts: usize, window_hours: i64 },
    LowHealth { score: f64, threshold: f64 },
}

impl RecoveryNeed {
    pub fn needs_recovery(&self) -> bool {
        !matches!(self, RecoveryNeed::Healthy { .. })
    }

    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RecoveryNeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryNeed::Healthy { .. } => f.write_str(HEALTHY_REASON),
            RecoveryNeed::ArtifactMissing { path } => {
                write!(f, "Main artifact missing: {}", path.display())
            }
            RecoveryNeed::RepeatedFailure {
                attempts,
                window_hours,
            } => write!(
                f,
                "Repeated recovery failure: {attempts} recovery attempts in the last {window_hours}h"
            ),
            RecoveryNeed::LowHealth { score, threshold } => {
                write!(f, "Health score {score:.2} below threshold {threshold:.2}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strings() {
        assert_eq!(RecoveryNeed::Healthy { score: 0.9 }.reason(), "Agent is healthy");
        assert_eq!(
            RecoveryNeed::LowHealth {
                score: 0.25,
                threshold: 0.5
            }
            .reason(),
            "Health score 0.25 below threshold 0.50"
        );
        assert_eq!(
            RecoveryNeed::RepeatedFailure {
                attempts: 3,
                window_hours: 24
            }
            .reason(),
            "Repeated recovery failure: 3 recovery attempts in the last 24h"
        );
    }

    #[test]
    fn test_only_healthy_skips_recovery() {
        assert!(!RecoveryNeed::Healthy { score: 1.0 }.needs_recovery());
        assert!(RecoveryNeed::ArtifactMissing {
            path: PathBuf::from("anima.py")
        }
        .needs_recovery());
    }
}
