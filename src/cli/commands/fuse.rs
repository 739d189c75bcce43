use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{parse_payload, print_json, Command};
use crate::bus::{handler_fn, Intent};
use crate::context::AppContext;
use crate::fusion::FusionStatus;

pub struct FuseCommand {
    pub requester: String,
    pub agents: Vec<String>,
    pub query: String,
    pub context: Option<String>,
    pub timeout_secs: Option<u64>,
    pub wait: bool,
    pub json: bool,
}

impl FuseCommand {
    pub fn new(requester: String, agents: Vec<String>, query: String) -> Self {
        Self {
            requester,
            agents,
            query,
            context: None,
            timeout_secs: None,
            wait: false,
            json: false,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Command for FuseCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        // Listen before requesting so the answer cannot slip past
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        if self.wait {
            ctx.bus
                .register(
                    &self.requester,
                    Some(handler_fn(move |message| {
                        tx.send(message.payload.clone())
                            .map_err(|_| anyhow::anyhow!("fuse command stopped listening"))
                    })),
                    [Intent::FusionResponse],
                )
                .await;
        }

        let fusion_id = ctx
            .fusion
            .request_fusion(
                &self.requester,
                self.agents.as_slice(),
                &self.query,
                self.context.as_deref().map(parse_payload),
                self.timeout_secs.map(Duration::from_secs),
            )
            .await?;

        if !self.wait {
            if self.json {
                return print_json(&serde_json::json!({ "fusion_id": fusion_id }));
            }
            println!("🧠 Fusion requested: {fusion_id}");
            println!("   👥 Participants: {}", self.agents.join(", "));
            println!("💡 Check progress with 'society fusion-status {fusion_id}'");
            return Ok(());
        }

        if !self.json {
            println!("🧠 Fusion {fusion_id} sent to {}; waiting...", self.agents.join(", "));
        }

        loop {
            let payload = rx
                .recv()
                .await
                .context("message bus closed before the fusion finished")?;
            if payload.get("fusion_id").and_then(Value::as_str) != Some(fusion_id.as_str()) {
                continue;
            }

            if self.json {
                return print_json(&payload);
            }
            let outcome = payload.get("outcome").and_then(Value::as_str).unwrap_or("unknown");
            println!("✅ Fusion finished ({outcome})");
            if let Some(missing) = payload.get("missing").and_then(Value::as_array) {
                if !missing.is_empty() {
                    println!("   ⏰ No answer from: {}", join_values(missing));
                }
            }
            println!();
            println!(
                "{}",
                payload.get("response").and_then(Value::as_str).unwrap_or_default()
            );
            return Ok(());
        }
    }
}

fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .filter_map(Value::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct FusionStatusCommand {
    pub fusion_id: String,
    pub json: bool,
}

impl FusionStatusCommand {
    pub fn new(fusion_id: String) -> Self {
        Self {
            fusion_id,
            json: false,
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Command for FusionStatusCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let status = ctx.fusion.get_fusion_status(&self.fusion_id).await?;

        if self.json {
            return print_json(&status);
        }

        match status {
            FusionStatus::Pending {
                responded,
                pending,
                elapsed_ms,
                ..
            } => {
                println!("⏳ Fusion {} pending for {elapsed_ms}ms", self.fusion_id);
                println!("   ✅ Responded: {}", responded.join(", "));
                println!("   ⏰ Waiting on: {}", pending.join(", "));
            }
            FusionStatus::Completed {
                outcome,
                duration_ms,
                ..
            } => {
                println!("✅ Fusion {} finished ({outcome:?}) in {duration_ms}ms", self.fusion_id);
                if let Some(result) = ctx.fusion.get_fusion_result(&self.fusion_id).await? {
                    println!();
                    println!("{}", result.combined_response);
                }
            }
            FusionStatus::NotFound => {
                println!("❓ No fusion with id {}", self.fusion_id);
            }
        }
        Ok(())
    }
}
