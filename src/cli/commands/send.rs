use anyhow::Result;
use serde_json::json;

use super::{parse_payload, print_json, Command};
use crate::bus::Intent;
use crate::context::AppContext;
use crate::priority::Priority;

pub struct SendCommand {
    pub from: String,
    pub to: String,
    pub intent: Intent,
    pub priority: i64,
    pub payload: String,
    pub json: bool,
}

impl SendCommand {
    pub fn new(from: String, to: String, intent: Intent, payload: String) -> Self {
        Self {
            from,
            to,
            intent,
            priority: Priority::LOW.value() as i64,
            payload,
            json: false,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Command for SendCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let priority = Priority::clamped(self.priority);
        let id = ctx
            .bus
            .send(
                &self.from,
                &self.to,
                self.intent.clone(),
                parse_payload(&self.payload),
                priority,
            )
            .await?;
        ctx.bus.flush().await?;

        if self.json {
            return print_json(&json!({ "message_id": id }));
        }
        println!("📨 Sent {} -> {} [{}] ({})", self.from, self.to, self.intent, priority);
        println!("   🆔 {id}");
        Ok(())
    }
}
