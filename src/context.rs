use anyhow::{Context as _, Result};
use std::sync::Arc;
use tracing::info;

use crate::bus::MessageBus;
use crate::config::SocietyConfig;
use crate::fusion::FusionCoordinator;
use crate::health::{HealthMonitor, JsonlSatisfactionFeed, SatisfactionFeed};
use crate::profile::ProfileRegistry;
use crate::recovery::RecoveryOrchestrator;
use crate::storage::LogStore;

/// Owns every service and wires them together. One per process.
pub struct AppContext {
    pub config: SocietyConfig,
    pub store: Arc<LogStore>,
    pub bus: Arc<MessageBus>,
    pub fusion: FusionCoordinator,
    pub health: Arc<HealthMonitor>,
    pub recovery: RecoveryOrchestrator,
    pub profiles: ProfileRegistry,
}

impl AppContext {
    /// Build with the JSONL satisfaction feed from the configuration
    pub async fn build(config: SocietyConfig) -> Result<Self> {
        let feed = Arc::new(JsonlSatisfactionFeed::new(
            config.storage.satisfaction_feed_path(),
        ));
        Self::with_feed(config, feed).await
    }

    pub async fn with_feed(config: SocietyConfig, feed: Arc<dyn SatisfactionFeed>) -> Result<Self> {
        let store = Arc::new(
            LogStore::open(&config.storage.data_dir)
                .await
                .with_context(|| {
                    format!("Failed to open log store at {}", config.storage.data_dir.display())
                })?,
        );
        let bus = Arc::new(MessageBus::start(Arc::clone(&store), &config.bus));
        let fusion =
            FusionCoordinator::start(Arc::clone(&bus), Arc::clone(&store), &config.fusion).await;

        let profiles = ProfileRegistry::from_profiles(config.recovery.agents.iter().cloned());
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&store),
            feed,
            config.health.clone(),
            profiles.clone(),
        ));
        let recovery = RecoveryOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&health),
            profiles.clone(),
            config.recovery.clone(),
        );

        info!(
            data_dir = %config.storage.data_dir.display(),
            profiled_agents = config.recovery.agents.len(),
            "Society context ready"
        );

        Ok(Self {
            config,
            store,
            bus,
            fusion,
            health,
            recovery,
            profiles,
        })
    }

    /// Cancel in-flight fusions and drain the bus
    pub async fn shutdown(&self) -> Result<()> {
        crate::shutdown::shutdown_services(self).await
    }
}
