use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use super::state_machine::RecoveryPhase;
use crate::bus::BusError;
use crate::health::{HealthError, HEALTHY_REASON};
use crate::storage::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Restarted,
    RestartFailed,
    /// Loop breaker refused to act
    Halted,
}

/// Append-only record of one recovery attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub record_id: String,
    pub agent: String,
    pub reason: String,
    pub action: RecoveryAction,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub final_phase: RecoveryPhase,
    /// Snapshot taken before restoring
    pub backup_id: Option<String>,
    pub restored_from: Option<String>,
    #[serde(default)]
    pub forced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecoveryRecord {
    pub fn new(
        agent: impl Into<String>,
        reason: impl Into<String>,
        action: RecoveryAction,
        final_phase: RecoveryPhase,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4().to_string(),
            agent: agent.into(),
            reason: reason.into(),
            success: action == RecoveryAction::Restarted,
            action,
            timestamp: Utc::now(),
            final_phase,
            backup_id: None,
            restored_from: None,
            forced: false,
            error: None,
        }
    }
}

/// What `recover` reports back to its caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryOutcome {
    pub agent: String,
    pub success: bool,
    pub reason: String,
    pub phase: RecoveryPhase,
    pub backup_id: Option<String>,
    pub restored_from: Option<String>,
    /// `None` when nothing was done
    pub record: Option<RecoveryRecord>,
}

impl RecoveryOutcome {
    pub(crate) fn healthy(agent: &str, phase: RecoveryPhase) -> Self {
        Self {
            agent: agent.to_string(),
            success: true,
            reason: HEALTHY_REASON.to_string(),
            phase,
            backup_id: None,
            restored_from: None,
            record: None,
        }
    }

    pub(crate) fn from_record(record: RecoveryRecord) -> Self {
        Self {
            agent: record.agent.clone(),
            success: record.success,
            reason: record.reason.clone(),
            phase: record.final_phase,
            backup_id: record.backup_id.clone(),
            restored_from: record.restored_from.clone(),
            record: Some(record),
        }
    }

    pub fn was_noop(&self) -> bool {
        self.record.is_none()
    }
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("Log store error: {0}")]
    Store(#[from] StoreError),

    #[error("Health check failed: {0}")]
    Health(#[from] HealthError),

    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Backup I/O failed at {path}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup manifest error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No recovery profile registered for agent '{0}'")]
    UnknownAgent(String),
}

impl RecoveryError {
    pub(crate) fn backup(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| RecoveryError::Backup { path, source }
    }
}
