use anyhow::Result;

use super::{print_json, Command};
use crate::context::AppContext;
use crate::recovery::RecoveryOutcome;

pub struct RecoverCommand {
    pub agent: String,
    pub force: bool,
    pub json: bool,
}

impl RecoverCommand {
    pub fn new(agent: String) -> Self {
        Self {
            agent,
            force: false,
            json: false,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Command for RecoverCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        if !self.json {
            println!("🛠️  Checking {}{}", self.agent, if self.force { " (forced)" } else { "" });
        }

        let outcome = ctx.recovery.recover(&self.agent, self.force).await?;
        ctx.bus.flush().await?;

        if self.json {
            return print_json(&outcome);
        }
        print_outcome(&outcome);
        Ok(())
    }
}

pub(crate) fn print_outcome(outcome: &RecoveryOutcome) {
    if outcome.was_noop() {
        println!("💚 {}: {}", outcome.agent, outcome.reason);
        return;
    }

    let icon = if outcome.success { "✅" } else { "❌" };
    println!("{icon} {} -> {} ({})", outcome.agent, outcome.phase, outcome.reason);
    if let Some(backup_id) = &outcome.backup_id {
        println!("   💾 Backup taken: {backup_id}");
    }
    match &outcome.restored_from {
        Some(restored) => println!("   ♻️  Restored from: {restored}"),
        None => println!("   ⚠️  Nothing restored"),
    }
    if let Some(error) = outcome.record.as_ref().and_then(|r| r.error.as_deref()) {
        println!("   🧾 {error}");
    }
}

pub struct HistoryCommand {
    pub agent: String,
    pub limit: usize,
    pub json: bool,
}

impl HistoryCommand {
    pub fn new(agent: String, limit: usize) -> Self {
        Self {
            agent,
            limit,
            json: false,
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Command for HistoryCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let records = ctx.recovery.recovery_history(&self.agent, self.limit).await?;

        if self.json {
            return print_json(&records);
        }
        if records.is_empty() {
            println!("📭 No recoveries recorded for {}", self.agent);
            return Ok(());
        }

        println!("🧾 RECOVERY HISTORY FOR {} (newest first)", self.agent);
        println!("─────────────────────────────");
        for record in &records {
            let icon = if record.success { "✅" } else { "❌" };
            println!(
                "{icon} {} {:?} -> {} {}{}",
                record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                record.action,
                record.final_phase,
                record.reason,
                if record.forced { " (forced)" } else { "" }
            );
        }
        Ok(())
    }
}
