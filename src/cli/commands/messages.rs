use anyhow::Result;

use super::{print_json, Command};
use crate::bus::MessageStatus;
use crate::context::AppContext;

pub struct MessagesCommand {
    pub agent: String,
    pub status: Option<MessageStatus>,
    pub limit: usize,
    pub json: bool,
}

impl MessagesCommand {
    pub fn new(agent: String) -> Self {
        Self {
            agent,
            status: None,
            limit: 20,
            json: false,
        }
    }

    pub fn with_status(mut self, status: Option<MessageStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Command for MessagesCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let messages = ctx
            .bus
            .get_messages(&self.agent, self.status, self.limit)
            .await?;

        if self.json {
            return print_json(&messages);
        }

        if messages.is_empty() {
            println!("📭 No messages for {}", self.agent);
            return Ok(());
        }

        println!("📬 MESSAGES FOR {} (newest first)", self.agent);
        println!("─────────────────────────────");
        for message in &messages {
            let icon = match message.status {
                MessageStatus::Processed => "✅",
                MessageStatus::Error => "❌",
                MessageStatus::Delivered => "📥",
                MessageStatus::Sent => "📤",
            };
            println!(
                "{icon} {} {} -> {} [{}] {} {}",
                message.created_at.format("%Y-%m-%d %H:%M:%S"),
                message.sender,
                message.receiver,
                message.intent,
                message.priority,
                message.payload
            );
        }
        Ok(())
    }
}
