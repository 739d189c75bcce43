use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{print_json, Command};
use crate::context::AppContext;

#[derive(Debug, Default, Serialize)]
struct AgentSummary {
    sent: usize,
    received: usize,
    profiled: bool,
}

pub struct AgentsCommand {
    pub json: bool,
}

impl AgentsCommand {
    pub fn new() -> Self {
        Self { json: false }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Default for AgentsCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for AgentsCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let mut agents: BTreeMap<String, AgentSummary> = BTreeMap::new();

        for message in ctx.store.load_messages().await? {
            agents.entry(message.sender).or_default().sent += 1;
            agents.entry(message.receiver).or_default().received += 1;
        }
        for name in ctx.profiles.names().await {
            agents.entry(name).or_default().profiled = true;
        }

        if self.json {
            return print_json(&agents);
        }
        if agents.is_empty() {
            println!("📋 No agents known yet");
            return Ok(());
        }

        println!("🤝 KNOWN AGENTS");
        println!("───────────────");
        for (name, summary) in &agents {
            let marker = if summary.profiled { "🛡️ " } else { "  " };
            println!(
                "{marker} {name} - {} sent, {} received",
                summary.sent, summary.received
            );
        }
        println!();
        println!("🛡️  = under recovery supervision");
        Ok(())
    }
}
