use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

fn default_health_threshold() -> f64 {
    0.5
}

fn default_backups_to_keep() -> usize {
    5
}

/// Static recovery description of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    /// The artifact whose absence means the agent cannot run
    pub main_artifact: PathBuf,
    /// Root of this agent's snapshots; each agent gets its own subdirectory
    pub backup_dir: PathBuf,
    #[serde(default = "default_health_threshold")]
    pub health_threshold: f64,
    /// Extra files captured alongside the main artifact
    #[serde(default)]
    pub dependency_artifacts: Vec<PathBuf>,
    #[serde(default = "default_backups_to_keep")]
    pub backups_to_keep: usize,
    /// Program and arguments run to restart the agent; empty means none
    #[serde(default)]
    pub restart_command: Vec<String>,
}

impl AgentProfile {
    pub fn new(
        name: impl Into<String>,
        main_artifact: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            main_artifact: main_artifact.into(),
            backup_dir: backup_dir.into(),
            health_threshold: default_health_threshold(),
            dependency_artifacts: Vec::new(),
            backups_to_keep: default_backups_to_keep(),
            restart_command: Vec::new(),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.health_threshold = threshold;
        self
    }

    pub fn with_dependency(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.dependency_artifacts.push(artifact.into());
        self
    }

    pub fn with_backups_to_keep(mut self, keep: usize) -> Self {
        self.backups_to_keep = keep;
        self
    }

    pub fn with_restart_command(mut self, command: Vec<String>) -> Self {
        self.restart_command = command;
        self
    }

    /// Main artifact first, then dependencies in declared order
    pub fn artifacts(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.main_artifact.as_path())
            .chain(self.dependency_artifacts.iter().map(PathBuf::as_path))
    }

    pub fn agent_backup_dir(&self) -> PathBuf {
        self.backup_dir.join(&self.name)
    }
}

/// Profiles shared between the health monitor and the recovery orchestrator
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    inner: Arc<RwLock<HashMap<String, AgentProfile>>>,
}

impl ProfileRegistry {
    pub fn from_profiles(profiles: impl IntoIterator<Item = AgentProfile>) -> Self {
        let map = profiles
            .into_iter()
            .map(|profile| (profile.name.clone(), profile))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn insert(&self, profile: AgentProfile) -> Option<AgentProfile> {
        self.inner
            .write()
            .await
            .insert(profile.name.clone(), profile)
    }

    pub async fn get(&self, agent: &str) -> Option<AgentProfile> {
        self.inner.read().await.get(agent).cloned()
    }

    /// Profiled agent names, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
