use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use moka::sync::Cache;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use super::synthesis::{KeywordSynthesis, SynthesisInput, SynthesisStrategy};
use super::types::{
    FusionOutcome, FusionRequestPayload, FusionResponsePayload, FusionResult, FusionStatus,
    NO_RESPONSE_PLACEHOLDER,
};
use super::FusionError;
use crate::bus::{Intent, Message, MessageBus, MessageHandler};
use crate::config::FusionConfig;
use crate::priority::Priority;
use crate::storage::LogStore;
use crate::telemetry::{create_coordination_span, generate_correlation_id};

struct PendingFusion {
    requester: String,
    participants: Vec<String>,
    query: String,
    context: Value,
    responses: HashMap<String, String>,
    started: Instant,
    started_at: DateTime<Utc>,
    timeout_task: Option<JoinHandle<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves one query across several agents by scatter-gather.
///
/// Every request finishes exactly once: either all participants answer, the
/// per-request timeout fires, or the request is cancelled. Whichever path
/// removes the entry from the pending map is the one that finalizes.
pub struct FusionCoordinator {
    inner: Arc<FusionInner>,
}

struct FusionInner {
    bus: Arc<MessageBus>,
    store: Arc<LogStore>,
    strategy: Arc<dyn SynthesisStrategy>,
    agent_name: String,
    default_timeout: Duration,
    pending: Mutex<HashMap<String, PendingFusion>>,
    /// Recently finished results; older ones are read back from the log
    completed: Cache<String, FusionResult>,
}

struct FusionResponseHandler {
    inner: Weak<FusionInner>,
}

#[async_trait]
impl MessageHandler for FusionResponseHandler {
    async fn handle(&self, message: &Message) -> anyhow::Result<()> {
        let Some(inner) = self.inner.upgrade() else {
            anyhow::bail!("fusion coordinator is gone");
        };
        inner.on_response(message).await
    }
}

impl FusionCoordinator {
    pub async fn start(bus: Arc<MessageBus>, store: Arc<LogStore>, config: &FusionConfig) -> Self {
        Self::with_strategy(bus, store, config, Arc::new(KeywordSynthesis)).await
    }

    /// Start with a custom merge strategy
    pub async fn with_strategy(
        bus: Arc<MessageBus>,
        store: Arc<LogStore>,
        config: &FusionConfig,
        strategy: Arc<dyn SynthesisStrategy>,
    ) -> Self {
        let inner = Arc::new(FusionInner {
            bus: Arc::clone(&bus),
            store,
            strategy,
            agent_name: config.agent_name.clone(),
            default_timeout: Duration::from_secs(config.default_timeout_secs),
            pending: Mutex::new(HashMap::new()),
            completed: Cache::builder()
                .max_capacity(config.max_cached_results.max(1) as u64)
                .build(),
        });

        let handler = Arc::new(FusionResponseHandler {
            inner: Arc::downgrade(&inner),
        });
        bus.register(&config.agent_name, Some(handler), [Intent::FusionResponse])
            .await;

        Self { inner }
    }

    /// Bus name participants must answer to
    pub fn agent_name(&self) -> &str {
        &self.inner.agent_name
    }

    /// Scatter `query` to every distinct agent and return the fusion id
    /// without waiting for answers.
    pub async fn request_fusion<S: AsRef<str>>(
        &self,
        requester: &str,
        agents: &[S],
        query: &str,
        context: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<String, FusionError> {
        let mut participants: Vec<String> = Vec::with_capacity(agents.len());
        for agent in agents {
            let agent = agent.as_ref();
            if !participants.iter().any(|p| p == agent) {
                participants.push(agent.to_string());
            }
        }

        if participants.len() < 2 {
            warn!(
                requester = %requester,
                distinct = participants.len(),
                "Rejected fusion request with too few participants"
            );
            return Err(FusionError::InvalidFusionRequest {
                distinct: participants.len(),
            });
        }

        let timeout = timeout.unwrap_or(self.inner.default_timeout);
        let context = context.unwrap_or(Value::Null);
        let fusion_id = Uuid::new_v4().to_string();
        let correlation_id = generate_correlation_id();
        let span = create_coordination_span(
            "request_fusion",
            Some(requester),
            Some(&fusion_id),
            Some(&correlation_id),
        );

        async move {
            let payload = serde_json::to_value(FusionRequestPayload {
                fusion_id: fusion_id.clone(),
                query: query.to_string(),
                context: context.clone(),
                timeout_ms: timeout.as_millis() as u64,
                reply_to: self.inner.agent_name.clone(),
            })?;

            lock(&self.inner.pending).insert(
                fusion_id.clone(),
                PendingFusion {
                    requester: requester.to_string(),
                    participants: participants.clone(),
                    query: query.to_string(),
                    context,
                    responses: HashMap::new(),
                    started: Instant::now(),
                    started_at: Utc::now(),
                    timeout_task: None,
                },
            );

            let watcher = self.spawn_timeout_watcher(&fusion_id, timeout);
            if let Some(fusion) = lock(&self.inner.pending).get_mut(&fusion_id) {
                fusion.timeout_task = Some(watcher);
            }

            for participant in &participants {
                if let Err(e) = self
                    .inner
                    .bus
                    .send(
                        &self.inner.agent_name,
                        participant,
                        Intent::FusionRequest,
                        payload.clone(),
                        Priority::default(),
                    )
                    .await
                {
                    // The watcher still finalizes this fusion with a placeholder
                    error!(
                        fusion_id = %fusion_id,
                        participant = %participant,
                        error = %e,
                        "Failed to send fusion request"
                    );
                }
            }

            info!(
                fusion_id = %fusion_id,
                participants = ?participants,
                timeout_ms = timeout.as_millis() as u64,
                "Fusion requested"
            );
            Ok(fusion_id)
        }
        .instrument(span)
        .await
    }

    fn spawn_timeout_watcher(&self, fusion_id: &str, timeout: Duration) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        let fusion_id = fusion_id.to_string();

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = inner.upgrade() {
                inner.finalize(&fusion_id, FusionOutcome::TimedOut).await;
            }
        })
    }

    pub async fn get_fusion_status(&self, fusion_id: &str) -> Result<FusionStatus, FusionError> {
        {
            let pending = lock(&self.inner.pending);
            if let Some(fusion) = pending.get(fusion_id) {
                let (responded, waiting): (Vec<String>, Vec<String>) = fusion
                    .participants
                    .iter()
                    .cloned()
                    .partition(|agent| fusion.responses.contains_key(agent));
                return Ok(FusionStatus::Pending {
                    fusion_id: fusion_id.to_string(),
                    responded,
                    pending: waiting,
                    elapsed_ms: fusion.started.elapsed().as_millis() as u64,
                });
            }
            if let Some(result) = self.inner.completed.get(fusion_id) {
                return Ok(completed_status(&result));
            }
        }

        Ok(match self.inner.store.find_fusion_result(fusion_id).await? {
            Some(result) => completed_status(&result),
            None => FusionStatus::NotFound,
        })
    }

    /// The persisted result of a finished fusion
    pub async fn get_fusion_result(
        &self,
        fusion_id: &str,
    ) -> Result<Option<FusionResult>, FusionError> {
        match self.inner.completed.get(fusion_id) {
            Some(result) => Ok(Some(result)),
            None => Ok(self.inner.store.find_fusion_result(fusion_id).await?),
        }
    }

    /// In-flight fusion ids, sorted
    pub fn pending_fusions(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.inner.pending).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Finish an in-flight fusion now, filling gaps with placeholders.
    /// Returns false if it had already finished.
    pub async fn cancel_fusion(&self, fusion_id: &str) -> bool {
        self.inner
            .finalize(fusion_id, FusionOutcome::Cancelled)
            .await
    }

    /// Cancel every in-flight fusion, returning how many were finalized
    pub async fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for fusion_id in self.pending_fusions() {
            if self.cancel_fusion(&fusion_id).await {
                cancelled += 1;
            }
        }
        cancelled
    }
}

fn completed_status(result: &FusionResult) -> FusionStatus {
    FusionStatus::Completed {
        fusion_id: result.fusion_id.clone(),
        outcome: result.outcome,
        duration_ms: result.duration_ms,
    }
}

impl FusionInner {
    async fn on_response(&self, message: &Message) -> anyhow::Result<()> {
        let payload: FusionResponsePayload = serde_json::from_value(message.payload.clone())
            .map_err(|e| anyhow::anyhow!("malformed fusion response from {}: {e}", message.sender))?;
        let fusion_id = payload.fusion_id;

        let complete = {
            let mut pending = lock(&self.pending);
            let Some(fusion) = pending.get_mut(&fusion_id) else {
                debug!(
                    fusion_id = %fusion_id,
                    agent = %message.sender,
                    "Response for unknown or finished fusion ignored"
                );
                return Ok(());
            };

            if !fusion.participants.iter().any(|p| p == &message.sender) {
                warn!(
                    fusion_id = %fusion_id,
                    agent = %message.sender,
                    "Response from non-participant ignored"
                );
                return Ok(());
            }

            // Last write wins for repeated answers
            if fusion
                .responses
                .insert(message.sender.clone(), payload.response)
                .is_some()
            {
                debug!(fusion_id = %fusion_id, agent = %message.sender, "Earlier response overwritten");
            }

            fusion.responses.len() == fusion.participants.len()
        };

        if complete {
            self.finalize(&fusion_id, FusionOutcome::Completed).await;
        }
        Ok(())
    }

    async fn finalize(&self, fusion_id: &str, outcome: FusionOutcome) -> bool {
        let (result, timeout_task) = {
            let mut pending = lock(&self.pending);
            let Some(mut fusion) = pending.remove(fusion_id) else {
                return false;
            };
            let timeout_task = fusion.timeout_task.take();
            let result = self.build_result(fusion_id, fusion, outcome);
            // Visible in the cache before the pending entry lock is released,
            // so status never reads NotFound in between
            self.completed.insert(fusion_id.to_string(), result.clone());
            (result, timeout_task)
        };

        // The watcher must not abort itself mid-finalize
        if outcome != FusionOutcome::TimedOut {
            if let Some(task) = timeout_task {
                task.abort();
            }
        }

        info!(
            fusion_id = %fusion_id,
            outcome = ?result.outcome,
            missing = ?result.missing,
            duration_ms = result.duration_ms,
            "Fusion finalized"
        );

        if let Err(e) = self.store.append_fusion_result(&result).await {
            error!(fusion_id = %fusion_id, error = %e, "Failed to persist fusion result");
        }

        let notification = json!({
            "fusion_id": result.fusion_id,
            "response": result.combined_response,
            "participants": result.participants,
            "missing": result.missing,
            "outcome": result.outcome,
        });
        if let Err(e) = self
            .bus
            .send(
                &self.agent_name,
                &result.requester,
                Intent::FusionResponse,
                notification,
                Priority::default(),
            )
            .await
        {
            error!(
                fusion_id = %fusion_id,
                requester = %result.requester,
                error = %e,
                "Failed to notify fusion requester"
            );
        }

        true
    }

    fn build_result(
        &self,
        fusion_id: &str,
        fusion: PendingFusion,
        outcome: FusionOutcome,
    ) -> FusionResult {
        let mut missing = Vec::new();
        let mut answers = Vec::with_capacity(fusion.participants.len());
        for agent in &fusion.participants {
            match fusion.responses.get(agent) {
                Some(response) => answers.push((agent.clone(), response.clone())),
                None => {
                    missing.push(agent.clone());
                    answers.push((agent.clone(), NO_RESPONSE_PLACEHOLDER.to_string()));
                }
            }
        }

        let combined_response = self.strategy.synthesize(&SynthesisInput {
            query: &fusion.query,
            context: &fusion.context,
            answers: &answers,
        });

        // The last answer can land just as the deadline fires
        let outcome = if outcome == FusionOutcome::TimedOut && missing.is_empty() {
            FusionOutcome::Completed
        } else {
            outcome
        };

        FusionResult {
            fusion_id: fusion_id.to_string(),
            requester: fusion.requester,
            query: fusion.query,
            participants: fusion.participants,
            responses: fusion.responses.into_iter().collect(),
            missing,
            combined_response,
            outcome,
            duration_ms: fusion.started.elapsed().as_millis() as u64,
            started_at: fusion.started_at,
            completed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::fusion::FusionOutcome;
    use tempfile::TempDir;

    async fn coordinator(dir: &TempDir) -> (Arc<MessageBus>, FusionCoordinator) {
        let store = Arc::new(LogStore::open(dir.path()).await.unwrap());
        let bus = Arc::new(MessageBus::start(Arc::clone(&store), &BusConfig::default()));
        let fusion = FusionCoordinator::start(Arc::clone(&bus), store, &FusionConfig::default()).await;
        (bus, fusion)
    }

    #[tokio::test]
    async fn test_rejects_single_distinct_participant() {
        let dir = TempDir::new().unwrap();
        let (_bus, fusion) = coordinator(&dir).await;

        let err = fusion
            .request_fusion("CLI", &["Anima", "Anima"], "hello?", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FusionError::InvalidFusionRequest { distinct: 1 }));
        assert!(fusion.pending_fusions().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_finalizes_once() {
        let dir = TempDir::new().unwrap();
        let (_bus, fusion) = coordinator(&dir).await;

        let id = fusion
            .request_fusion("CLI", &["Anima", "GPTSoul"], "what now?", None, Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(fusion.get_fusion_status(&id).await.unwrap().is_pending());

        assert!(fusion.cancel_fusion(&id).await);
        assert!(!fusion.cancel_fusion(&id).await);

        let result = fusion.get_fusion_result(&id).await.unwrap().unwrap();
        assert_eq!(result.outcome, FusionOutcome::Cancelled);
        assert_eq!(result.missing, vec!["Anima".to_string(), "GPTSoul".to_string()]);
        assert!(result.combined_response.contains(NO_RESPONSE_PLACEHOLDER));
    }

    #[tokio::test]
    async fn test_unknown_fusion_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (_bus, fusion) = coordinator(&dir).await;

        assert_eq!(
            fusion.get_fusion_status("missing").await.unwrap(),
            FusionStatus::NotFound
        );
    }

    #[tokio::test]
    async fn test_finished_results_are_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LogStore::open(dir.path()).await.unwrap());
        let bus = Arc::new(MessageBus::start(Arc::clone(&store), &BusConfig::default()));
        let config = FusionConfig {
            max_cached_results: 2,
            ..FusionConfig::default()
        };
        let fusion = FusionCoordinator::start(bus, store, &config).await;

        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = fusion
                .request_fusion("CLI", &["Anima", "GPTSoul"], "what now?", None, Some(Duration::from_secs(60)))
                .await
                .unwrap();
            assert!(fusion.cancel_fusion(&id).await);
            ids.push(id);
        }

        fusion.inner.completed.run_pending_tasks();
        assert!(fusion.inner.completed.entry_count() <= 2);

        // Evicted or not, every result is still readable
        for id in &ids {
            let result = fusion.get_fusion_result(id).await.unwrap().unwrap();
            assert_eq!(result.outcome, FusionOutcome::Cancelled);
        }
    }
}
