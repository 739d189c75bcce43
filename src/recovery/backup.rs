//! Per-agent artifact snapshots.
//!
//! Layout: `<backup_dir>/<agent>/<backup_id>/` holding one copy per artifact
//! plus a `manifest.json`. Backup ids sort chronologically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::RecoveryError;
use crate::profile::AgentProfile;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackedUpArtifact {
    /// Where the artifact lives when the agent runs
    pub source: PathBuf,
    /// File name inside the snapshot directory
    pub stored_as: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub backup_id: String,
    pub agent: String,
    pub created_at: DateTime<Utc>,
    pub hostname: String,
    pub artifacts: Vec<BackedUpArtifact>,
    /// Artifacts that did not exist at capture time
    pub missing: Vec<PathBuf>,
}

impl BackupSnapshot {
    /// Whether `path` was captured in this snapshot
    pub fn contains(&self, path: &Path) -> bool {
        self.artifacts.iter().any(|a| a.source == path)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BackupManager;

impl BackupManager {
    /// Copy the profile's artifacts into a new snapshot. Missing artifacts
    /// are recorded in the manifest, not treated as errors.
    pub async fn snapshot(&self, profile: &AgentProfile) -> Result<BackupSnapshot, RecoveryError> {
        let created_at = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        let backup_id = format!(
            "{}-{}",
            created_at.format("%Y%m%dT%H%M%S%.6fZ"),
            &suffix[..8]
        );
        let dir = backup_path(profile, &backup_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(RecoveryError::backup(&dir))?;

        let mut artifacts = Vec::new();
        let mut missing = Vec::new();

        for (index, source) in profile.artifacts().enumerate() {
            let file_name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "artifact".to_string());
            let stored_as = format!("{index:02}-{file_name}");

            match fs::copy(source, dir.join(&stored_as)).await {
                Ok(_) => artifacts.push(BackedUpArtifact {
                    source: source.to_path_buf(),
                    stored_as,
                }),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(
                        agent = %profile.name,
                        artifact = %source.display(),
                        "Artifact missing at backup time"
                    );
                    missing.push(source.to_path_buf());
                }
                Err(e) => return Err(RecoveryError::backup(source)(e)),
            }
        }

        let snapshot = BackupSnapshot {
            backup_id,
            agent: profile.name.clone(),
            created_at,
            hostname: hostname::get()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            artifacts,
            missing,
        };

        // Write then rename so a listing never sees a half-written manifest
        let manifest = dir.join(MANIFEST_FILE);
        let temp = dir.join(format!("{MANIFEST_FILE}.tmp"));
        fs::write(&temp, serde_json::to_vec_pretty(&snapshot)?)
            .await
            .map_err(RecoveryError::backup(&temp))?;
        fs::rename(&temp, &manifest)
            .await
            .map_err(RecoveryError::backup(&manifest))?;

        info!(
            agent = %profile.name,
            backup_id = %snapshot.backup_id,
            captured = snapshot.artifacts.len(),
            missing = snapshot.missing.len(),
            "Backup snapshot taken"
        );
        Ok(snapshot)
    }

    /// Snapshots for the agent, oldest first
    pub async fn list_backups(
        &self,
        profile: &AgentProfile,
    ) -> Result<Vec<BackupSnapshot>, RecoveryError> {
        let root = profile.agent_backup_dir();
        let mut entries = match fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RecoveryError::backup(&root)(e)),
        };

        let mut snapshots = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(RecoveryError::backup(&root))?
        {
            if !entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let manifest = entry.path().join(MANIFEST_FILE);
            let bytes = match fs::read(&manifest).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(RecoveryError::backup(&manifest)(e)),
            };
            match serde_json::from_slice::<BackupSnapshot>(&bytes) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => {
                    warn!(manifest = %manifest.display(), error = %e, "Skipping unreadable backup manifest");
                }
            }
        }

        snapshots.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.backup_id.cmp(&b.backup_id))
        });
        Ok(snapshots)
    }

    /// Copy every captured artifact back to its source path. Returns how
    /// many files were restored.
    pub async fn restore(
        &self,
        profile: &AgentProfile,
        snapshot: &BackupSnapshot,
    ) -> Result<usize, RecoveryError> {
        let dir = backup_path(profile, &snapshot.backup_id);

        for artifact in &snapshot.artifacts {
            if let Some(parent) = artifact.source.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .await
                    .map_err(RecoveryError::backup(parent))?;
            }
            let stored = dir.join(&artifact.stored_as);
            fs::copy(&stored, &artifact.source)
                .await
                .map_err(RecoveryError::backup(&stored))?;
            debug!(
                agent = %profile.name,
                artifact = %artifact.source.display(),
                "Artifact restored"
            );
        }

        info!(
            agent = %profile.name,
            backup_id = %snapshot.backup_id,
            restored = snapshot.artifacts.len(),
            "Restored from backup"
        );
        Ok(snapshot.artifacts.len())
    }

    /// Delete all but the newest `backups_to_keep` snapshots (at least one
    /// is always kept). Returns how many were removed.
    pub async fn prune(&self, profile: &AgentProfile) -> Result<usize, RecoveryError> {
        let snapshots = self.list_backups(profile).await?;
        let keep = profile.backups_to_keep.max(1);
        let excess = snapshots.len().saturating_sub(keep);

        for snapshot in &snapshots[..excess] {
            let dir = backup_path(profile, &snapshot.backup_id);
            fs::remove_dir_all(&dir)
                .await
                .map_err(RecoveryError::backup(&dir))?;
            debug!(agent = %profile.name, backup_id = %snapshot.backup_id, "Old backup pruned");
        }
        Ok(excess)
    }
}

pub(crate) fn backup_path(profile: &AgentProfile, backup_id: &str) -> PathBuf {
    profile.agent_backup_dir().join(backup_id)
}
