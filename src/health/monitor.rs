use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::metrics::{score, inactivity_penalty, HealthInputs, HealthMetrics};
use super::satisfaction::SatisfactionFeed;
use super::{HealthError, RecoveryNeed};
use crate::bus::MessageStatus;
use crate::config::HealthConfig;
use crate::profile::ProfileRegistry;
use crate::recovery::RecoveryAction;
use crate::storage::LogStore;

/// Scores agents from their interaction history and decides when they need
/// to be recovered
pub struct HealthMonitor {
    store: Arc<LogStore>,
    feed: Arc<dyn SatisfactionFeed>,
    config: HealthConfig,
    profiles: ProfileRegistry,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<LogStore>,
        feed: Arc<dyn SatisfactionFeed>,
        config: HealthConfig,
        profiles: ProfileRegistry,
    ) -> Self {
        Self {
            store,
            feed,
            config,
            profiles,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    pub async fn compute_health(&self, agent: &str) -> Result<HealthMetrics, HealthError> {
        let messages = self.store.load_messages().await?;
        let now = Utc::now();

        let mut sent_count = 0usize;
        let mut received_count = 0usize;
        let mut error_count = 0usize;
        let mut last_active = None;

        for message in &messages {
            if message.sender == agent {
                sent_count += 1;
                if message.status == MessageStatus::Error {
                    error_count += 1;
                }
                if last_active.map_or(true, |t| message.created_at > t) {
                    last_active = Some(message.created_at);
                }
            }
            if message.receiver == agent {
                received_count += 1;
            }
        }

        let response_rate = if received_count == 0 {
            0.0
        } else {
            sent_count as f64 / received_count as f64
        };
        let error_rate = if sent_count == 0 {
            0.0
        } else {
            error_count as f64 / sent_count as f64
        };
        let avg_satisfaction = self.average_satisfaction(agent).await;
        let hours_since_active =
            last_active.map(|t| (now - t).num_milliseconds() as f64 / 3_600_000.0);

        let inputs = HealthInputs {
            response_rate,
            avg_satisfaction,
            error_rate,
            hours_since_active,
        };
        let health_score = score(&inputs, &self.config);

        debug!(
            agent = %agent,
            sent = sent_count,
            received = received_count,
            response_rate,
            error_rate,
            avg_satisfaction,
            health_score,
            "Health computed"
        );

        Ok(HealthMetrics {
            agent: agent.to_string(),
            message_count: messages.iter().filter(|m| m.involves(agent)).count(),
            sent_count,
            received_count,
            response_rate,
            avg_satisfaction,
            error_rate,
            last_active,
            inactivity_penalty: inactivity_penalty(hours_since_active, &self.config),
            health_score,
            computed_at: now,
        })
    }

    async fn average_satisfaction(&self, agent: &str) -> f64 {
        let samples = match self
            .feed
            .recent_samples(agent, self.config.satisfaction_sample_window)
            .await
        {
            Ok(samples) => samples,
            Err(e) => {
                warn!(agent = %agent, error = %e, "Satisfaction feed unavailable, using default");
                return self.config.default_satisfaction;
            }
        };

        let values: Vec<f64> = samples
            .iter()
            .map(|s| s.value)
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            return self.config.default_satisfaction;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    /// Decide whether `agent` needs recovery.
    ///
    /// The loop breaker wins over everything, a missing main artifact
    /// included. A missing main artifact wins over the score. Agents without a profile skip the artifact check and
    /// use the default threshold.
    pub async fn needs_recovery(&self, agent: &str) -> Result<RecoveryNeed, HealthError> {
        let profile = self.profiles.get(agent).await;

        let attempts = self.recent_recovery_attempts(agent).await?;
        if attempts >= self.config.loop_breaker_attempts {
            warn!(
                agent = %agent,
                attempts,
                window_hours = self.config.loop_breaker_window_hours,
                "Loop breaker tripped"
            );
            return Ok(RecoveryNeed::RepeatedFailure {
                attempts,
                window_hours: self.config.loop_breaker_window_hours,
            });
        }

        if let Some(profile) = &profile {
            let exists = tokio::fs::try_exists(&profile.main_artifact)
                .await
                .unwrap_or(false);
            if !exists {
                warn!(
                    agent = %agent,
                    artifact = %profile.main_artifact.display(),
                    "Main artifact missing"
                );
                return Ok(RecoveryNeed::ArtifactMissing {
                    path: profile.main_artifact.clone(),
                });
            }
        }

        let threshold = profile
            .as_ref()
            .map_or(self.config.default_threshold, |p| p.health_threshold);
        let score = self.compute_health(agent).await?.health_score;

        if score < threshold {
            info!(agent = %agent, score, threshold, "Health below threshold");
            Ok(RecoveryNeed::LowHealth { score, threshold })
        } else {
            Ok(RecoveryNeed::Healthy { score })
        }
    }

    /// Recovery attempts inside the loop-breaker window. Halts written by
    /// the breaker itself are not attempts.
    async fn recent_recovery_attempts(&self, agent: &str) -> Result<usize, HealthError> {
        let since = Utc::now() - Duration::hours(self.config.loop_breaker_window_hours);
        Ok(self
            .store
            .load_recovery_records(Some(agent))
            .await?
            .iter()
            .filter(|r| r.timestamp >= since && r.action != RecoveryAction::Halted)
            .count())
    }
}
