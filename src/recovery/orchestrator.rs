use serde_json::json;
use statig::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn, Instrument};

use super::backup::{BackupManager, BackupSnapshot};
use super::restart::{CommandRestart, NoopRestart, RestartProcedure};
use super::state_machine::{RecoveryEvent, RecoveryMachine, RecoveryPhase};
use super::types::{RecoveryAction, RecoveryError, RecoveryOutcome, RecoveryRecord};
use crate::bus::{Intent, MessageBus};
use crate::config::RecoveryConfig;
use crate::health::{HealthMonitor, RecoveryNeed};
use crate::priority::Priority;
use crate::profile::{AgentProfile, ProfileRegistry};
use crate::storage::LogStore;
use crate::telemetry::{create_coordination_span, generate_correlation_id};

type Machine = Arc<Mutex<StateMachine<RecoveryMachine>>>;

/// Drives backup, restore and restart for unhealthy agents.
///
/// Each agent has its own state machine behind its own lock, so recoveries
/// of one agent are serialized while different agents proceed in parallel.
pub struct RecoveryOrchestrator {
    store: Arc<LogStore>,
    bus: Arc<MessageBus>,
    health: Arc<HealthMonitor>,
    profiles: ProfileRegistry,
    config: RecoveryConfig,
    backups: BackupManager,
    machines: Mutex<HashMap<String, Machine>>,
    restarts: RwLock<HashMap<String, Arc<dyn RestartProcedure>>>,
}

impl RecoveryOrchestrator {
    pub fn new(
        store: Arc<LogStore>,
        bus: Arc<MessageBus>,
        health: Arc<HealthMonitor>,
        profiles: ProfileRegistry,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            store,
            bus,
            health,
            profiles,
            config,
            backups: BackupManager,
            machines: Mutex::new(HashMap::new()),
            restarts: RwLock::new(HashMap::new()),
        }
    }

    /// Put an agent under supervision with an explicit restart procedure
    pub async fn register_agent(&self, profile: AgentProfile, restart: Arc<dyn RestartProcedure>) {
        info!(agent = %profile.name, artifact = %profile.main_artifact.display(), "Agent registered for recovery");
        self.restarts
            .write()
            .await
            .insert(profile.name.clone(), restart);
        self.profiles.insert(profile).await;
    }

    async fn machine(&self, agent: &str) -> Machine {
        let mut machines = self.machines.lock().await;
        Arc::clone(
            machines
                .entry(agent.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(RecoveryMachine::new(agent).state_machine()))),
        )
    }

    async fn restart_procedure(&self, profile: &AgentProfile) -> Arc<dyn RestartProcedure> {
        if let Some(restart) = self.restarts.read().await.get(&profile.name) {
            return Arc::clone(restart);
        }
        match CommandRestart::from_command(
            &profile.restart_command,
            Duration::from_secs(self.config.restart_timeout_secs),
        ) {
            Some(command) => Arc::new(command),
            None => Arc::new(NoopRestart),
        }
    }

    /// Current phase, `None` if the agent was never seen
    pub async fn phase(&self, agent: &str) -> Option<RecoveryPhase> {
        let machine = self.machines.lock().await.get(agent).cloned()?;
        let machine = machine.lock().await;
        Some(machine.inner().phase())
    }

    /// Check `agent` and, if needed (or `force`), run a full recovery.
    pub async fn recover(&self, agent: &str, force: bool) -> Result<RecoveryOutcome, RecoveryError> {
        let correlation_id = generate_correlation_id();
        let span = create_coordination_span("recover", Some(agent), None, Some(&correlation_id));
        self.recover_inner(agent, force).instrument(span).await
    }

    async fn recover_inner(&self, agent: &str, force: bool) -> Result<RecoveryOutcome, RecoveryError> {
        let machine = self.machine(agent).await;
        let mut machine = machine.lock().await;

        let need = self.health.needs_recovery(agent).await?;
        let reason = match (&need, force) {
            (RecoveryNeed::Healthy { score }, false) => {
                info!(agent = %agent, score, "Agent is healthy, nothing to recover");
                return Ok(RecoveryOutcome::healthy(agent, machine.inner().phase()));
            }
            (RecoveryNeed::RepeatedFailure { .. }, false) => {
                machine.handle(&RecoveryEvent::LoopBreakerTripped);
                return self.halt(agent, &need, machine.inner().phase()).await;
            }
            (_, false) => need.reason(),
            (_, true) => format!("Forced recovery: {need}"),
        };

        let profile = self
            .profiles
            .get(agent)
            .await
            .ok_or_else(|| RecoveryError::UnknownAgent(agent.to_string()))?;

        info!(agent = %agent, reason = %reason, force, "Recovery started");
        machine.handle(&RecoveryEvent::Begin);

        // Restore point: the newest earlier backup that holds the main
        // artifact, else simply the newest earlier backup
        let prior = match self.backups.list_backups(&profile).await {
            Ok(backups) => backups
                .iter()
                .rev()
                .find(|b| b.contains(&profile.main_artifact))
                .or(backups.last())
                .cloned(),
            Err(e) => {
                warn!(agent = %agent, error = %e, "Could not list backups");
                None
            }
        };

        let backup_id = match self.backups.snapshot(&profile).await {
            Ok(snapshot) => Some(snapshot.backup_id),
            Err(e) => {
                warn!(agent = %agent, error = %e, "Backup failed, continuing recovery");
                None
            }
        };
        machine.handle(&RecoveryEvent::BackupFinished);

        let restored_from = match &prior {
            Some(snapshot) => match self.backups.restore(&profile, snapshot).await {
                Ok(_) => Some(snapshot.backup_id.clone()),
                Err(e) => {
                    error!(agent = %agent, backup_id = %snapshot.backup_id, error = %e, "Restore failed");
                    None
                }
            },
            None => {
                warn!(agent = %agent, "No prior backup to restore from");
                None
            }
        };
        machine.handle(&RecoveryEvent::RestoreFinished);

        let restart = self.restart_procedure(&profile).await;
        let restart_error = match restart.restart(agent).await {
            Ok(()) => {
                machine.handle(&RecoveryEvent::RestartSucceeded);
                None
            }
            Err(e) => {
                error!(agent = %agent, error = %format!("{e:#}"), "Restart failed");
                machine.handle(&RecoveryEvent::RestartFailed);
                Some(format!("{e:#}"))
            }
        };

        if let Err(e) = self.backups.prune(&profile).await {
            warn!(agent = %agent, error = %e, "Pruning old backups failed");
        }

        let action = if restart_error.is_none() {
            RecoveryAction::Restarted
        } else {
            RecoveryAction::RestartFailed
        };
        let mut record = RecoveryRecord::new(agent, reason, action, machine.inner().phase());
        record.backup_id = backup_id;
        record.restored_from = restored_from;
        record.forced = force;
        record.error = restart_error;

        self.store.append_recovery_record(&record).await?;
        self.announce(&record).await;

        info!(
            agent = %agent,
            success = record.success,
            phase = %record.final_phase,
            record_id = %record.record_id,
            "Recovery finished"
        );
        Ok(RecoveryOutcome::from_record(record))
    }

    async fn halt(
        &self,
        agent: &str,
        need: &RecoveryNeed,
        phase: RecoveryPhase,
    ) -> Result<RecoveryOutcome, RecoveryError> {
        error!(agent = %agent, reason = %need, "Recovery halted by loop breaker, escalate to an operator");
        let record = RecoveryRecord::new(agent, need.reason(), RecoveryAction::Halted, phase);
        self.store.append_recovery_record(&record).await?;
        Ok(RecoveryOutcome::from_record(record))
    }

    async fn announce(&self, record: &RecoveryRecord) {
        let payload = json!({
            "agent": record.agent,
            "success": record.success,
            "reason": record.reason,
            "phase": record.final_phase,
            "record_id": record.record_id,
        });
        if let Err(e) = self
            .bus
            .broadcast(
                &self.config.agent_name,
                Intent::AgentResurrected,
                payload,
                Priority::HIGH,
            )
            .await
        {
            warn!(agent = %record.agent, error = %e, "Failed to broadcast agent_resurrected");
        }
    }

    /// The agent's recovery records, newest first
    pub async fn recovery_history(
        &self,
        agent: &str,
        limit: usize,
    ) -> Result<Vec<RecoveryRecord>, RecoveryError> {
        let records = self.store.load_recovery_records(Some(agent)).await?;
        Ok(records.into_iter().rev().take(limit).collect())
    }

    /// Snapshots on disk for a profiled agent, oldest first
    pub async fn backups(&self, agent: &str) -> Result<Vec<BackupSnapshot>, RecoveryError> {
        let profile = self
            .profiles
            .get(agent)
            .await
            .ok_or_else(|| RecoveryError::UnknownAgent(agent.to_string()))?;
        self.backups.list_backups(&profile).await
    }

    /// Check every profiled agent once. Failures are logged per agent.
    pub async fn sweep(&self) -> Vec<RecoveryOutcome> {
        let mut outcomes = Vec::new();
        for agent in self.profiles.names().await {
            match self.recover(&agent, false).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(agent = %agent, error = %e, "Recovery check failed"),
            }
        }
        outcomes
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BusConfig, HealthConfig};
    use crate::health::InMemorySatisfactionFeed;
    use crate::recovery::restart::MockRestartProcedure;
    use std::path::PathBuf;
    use tempfile::TempDir;

    async fn orchestrator(dir: &TempDir) -> (RecoveryOrchestrator, PathBuf) {
        let store = Arc::new(LogStore::open(dir.path().join("data")).await.unwrap());
        let bus = Arc::new(MessageBus::start(Arc::clone(&store), &BusConfig::default()));
        let profiles = ProfileRegistry::default();
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&store),
            Arc::new(InMemorySatisfactionFeed::new()),
            HealthConfig::default(),
            profiles.clone(),
        ));
        let orchestrator = RecoveryOrchestrator::new(
            store,
            bus,
            health,
            profiles,
            RecoveryConfig::default(),
        );
        (orchestrator, dir.path().join("anima.py"))
    }

    #[tokio::test]
    async fn test_missing_artifact_triggers_restart() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, artifact) = orchestrator(&dir).await;

        let mut restart = MockRestartProcedure::new();
        restart
            .expect_restart()
            .withf(|agent| agent == "Anima")
            .times(1)
            .returning(|_| Ok(()));
        orchestrator
            .register_agent(
                AgentProfile::new("Anima", &artifact, dir.path().join("backups")),
                Arc::new(restart),
            )
            .await;
        assert_eq!(orchestrator.phase("Anima").await, None);

        let outcome = orchestrator.recover("Anima", false).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.reason.contains("anima.py"));
        assert!(outcome.restored_from.is_none());
        assert_eq!(orchestrator.phase("Anima").await, Some(RecoveryPhase::Recovered));
    }

    #[tokio::test]
    async fn test_restart_error_is_kept_on_the_record() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, artifact) = orchestrator(&dir).await;
        tokio::fs::write(&artifact, "x").await.unwrap();

        let mut restart = MockRestartProcedure::new();
        restart
            .expect_restart()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("port already in use")));
        orchestrator
            .register_agent(
                AgentProfile::new("Anima", &artifact, dir.path().join("backups")),
                Arc::new(restart),
            )
            .await;

        let outcome = orchestrator.recover("Anima", true).await.unwrap();
        assert_eq!(outcome.phase, RecoveryPhase::FailedRestart);
        let record = outcome.record.unwrap();
        assert_eq!(record.action, RecoveryAction::RestartFailed);
        assert_eq!(record.error.as_deref(), Some("port already in use"));
        assert_eq!(orchestrator.backups("Anima").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backups_of_unknown_agent() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(&dir).await;
        assert!(matches!(
            orchestrator.backups("Ghost").await,
            Err(RecoveryError::UnknownAgent(_))
        ));
    }
}
