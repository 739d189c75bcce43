//! Shared harness for integration tests: a temp-dir log store, a running
//! bus and scripted agents that answer fusion requests.
#![allow(dead_code)]

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, Notify};

use society_protocol::bus::{handler_fn, Intent, Message, MessageBus, MessageHandler};
use society_protocol::config::{BusConfig, FusionConfig};
use society_protocol::fusion::{FusionCoordinator, FusionRequestPayload, FusionResult};
use society_protocol::{LogStore, Priority};

pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<LogStore>,
    pub bus: Arc<MessageBus>,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store = Arc::new(
            LogStore::open(dir.path().join("data"))
                .await
                .expect("open log store"),
        );
        let bus = Arc::new(MessageBus::start(Arc::clone(&store), &BusConfig::default()));
        Self { dir, store, bus }
    }

    pub async fn fusion(&self) -> FusionCoordinator {
        FusionCoordinator::start(
            Arc::clone(&self.bus),
            Arc::clone(&self.store),
            &FusionConfig::default(),
        )
        .await
    }

    /// Register `name` as an agent that answers every fusion request
    pub async fn answering_agent(&self, name: &str, answer: &str) {
        let agent = AnsweringAgent {
            name: name.to_string(),
            answer: answer.to_string(),
            bus: Arc::downgrade(&self.bus),
        };
        self.bus.register(name, Some(Arc::new(agent)), []).await;
    }

    /// Register `name` with a handler that accepts and ignores everything
    pub async fn silent_agent(&self, name: &str) {
        self.bus
            .register(name, Some(handler_fn(|_| Ok(()))), [])
            .await;
    }

    /// Register `name` and return a channel receiving everything it gets
    pub async fn recording_agent(
        &self,
        name: &str,
        intents: Vec<Intent>,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.bus
            .register(
                name,
                Some(handler_fn(move |message| {
                    tx.send(message.clone())
                        .map_err(|_| anyhow::anyhow!("recorder dropped"))
                })),
                intents,
            )
            .await;
        rx
    }

    /// Register `name` with a handler that holds the dispatch worker until
    /// the returned notify is triggered
    pub async fn gate_agent(&self, name: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        let handler = GateAgent {
            gate: Arc::clone(&gate),
        };
        self.bus.register(name, Some(Arc::new(handler)), []).await;
        gate
    }
}

struct AnsweringAgent {
    name: String,
    answer: String,
    bus: Weak<MessageBus>,
}

#[async_trait]
impl MessageHandler for AnsweringAgent {
    async fn handle(&self, message: &Message) -> anyhow::Result<()> {
        if message.intent != Intent::FusionRequest {
            return Ok(());
        }
        let request: FusionRequestPayload = serde_json::from_value(message.payload.clone())?;
        let bus = self.bus.upgrade().context("bus dropped")?;
        bus.send(
            &self.name,
            &request.reply_to,
            Intent::FusionResponse,
            json!({ "fusion_id": request.fusion_id, "response": self.answer }),
            Priority::NORMAL,
        )
        .await?;
        Ok(())
    }
}

struct GateAgent {
    gate: Arc<Notify>,
}

#[async_trait]
impl MessageHandler for GateAgent {
    async fn handle(&self, _message: &Message) -> anyhow::Result<()> {
        self.gate.notified().await;
        Ok(())
    }
}

/// Poll until the fusion has a persisted result
pub async fn wait_for_result(
    fusion: &FusionCoordinator,
    fusion_id: &str,
    within: Duration,
) -> FusionResult {
    tokio::time::timeout(within, async {
        loop {
            if let Some(result) = fusion.get_fusion_result(fusion_id).await.unwrap() {
                return result;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("fusion did not finish in time")
}
