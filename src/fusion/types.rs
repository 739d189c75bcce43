use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Stands in for a participant that did not answer in time
pub const NO_RESPONSE_PLACEHOLDER: &str = "(no response received)";

/// Payload of the `fusion_request` message each participant receives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionRequestPayload {
    pub fusion_id: String,
    pub query: String,
    #[serde(default)]
    pub context: Value,
    pub timeout_ms: u64,
    /// Bus name answers must be sent to
    pub reply_to: String,
}

/// Payload of a participant's `fusion_response` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResponsePayload {
    pub fusion_id: String,
    pub response: String,
}

/// How a fusion reached completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionOutcome {
    /// Every participant answered
    Completed,
    TimedOut,
    Cancelled,
}

/// Permanent record of a finished fusion. Written exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub fusion_id: String,
    pub requester: String,
    pub query: String,
    /// Participants in request order
    pub participants: Vec<String>,
    /// Answers actually received, keyed by agent
    pub responses: BTreeMap<String, String>,
    /// Participants that were filled with the placeholder
    pub missing: Vec<String>,
    pub combined_response: String,
    pub outcome: FusionOutcome,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Answer of `get_fusion_status`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FusionStatus {
    Pending {
        fusion_id: String,
        responded: Vec<String>,
        pending: Vec<String>,
        elapsed_ms: u64,
    },
    Completed {
        fusion_id: String,
        outcome: FusionOutcome,
        duration_ms: u64,
    },
    NotFound,
}

impl FusionStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, FusionStatus::Pending { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, FusionStatus::Completed { .. })
    }
}
