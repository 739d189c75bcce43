use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::storage::jsonl;

/// One external satisfaction reading for an agent, nominally in `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatisfactionSample {
    pub agent: String,
    pub value: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl SatisfactionSample {
    pub fn new(agent: impl Into<String>, value: f64) -> Self {
        Self {
            agent: agent.into(),
            value,
            timestamp: Utc::now(),
        }
    }
}

/// Source of satisfaction readings consumed by the health monitor
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SatisfactionFeed: Send + Sync {
    /// The newest `limit` samples for `agent`, oldest first
    async fn recent_samples(
        &self,
        agent: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<SatisfactionSample>>;
}

fn newest(mut samples: Vec<SatisfactionSample>, limit: usize) -> Vec<SatisfactionSample> {
    samples.sort_by_key(|s| s.timestamp);
    let skip = samples.len().saturating_sub(limit);
    samples.split_off(skip)
}

/// Reads `{agent, value, timestamp}` lines written by an external rater
#[derive(Debug, Clone)]
pub struct JsonlSatisfactionFeed {
    path: PathBuf,
}

impl JsonlSatisfactionFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, sample: &SatisfactionSample) -> anyhow::Result<()> {
        jsonl::append_entry(&self.path, sample).await?;
        Ok(())
    }
}

#[async_trait]
impl SatisfactionFeed for JsonlSatisfactionFeed {
    async fn recent_samples(
        &self,
        agent: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<SatisfactionSample>> {
        let samples: Vec<SatisfactionSample> = jsonl::read_entries(&self.path).await?;
        let mine = samples.into_iter().filter(|s| s.agent == agent).collect();
        Ok(newest(mine, limit))
    }
}

#[derive(Debug, Default)]
pub struct InMemorySatisfactionFeed {
    samples: RwLock<Vec<SatisfactionSample>>,
}

impl InMemorySatisfactionFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, sample: SatisfactionSample) {
        self.samples.write().await.push(sample);
    }
}

#[async_trait]
impl SatisfactionFeed for InMemorySatisfactionFeed {
    async fn recent_samples(
        &self,
        agent: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<SatisfactionSample>> {
        let mine = self
            .samples
            .read()
            .await
            .iter()
            .filter(|s| s.agent == agent)
            .cloned()
            .collect();
        Ok(newest(mine, limit))
    }
}
