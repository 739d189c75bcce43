use anyhow::Result;
use serde_json::json;

use super::{print_json, Command};
use crate::context::AppContext;
use crate::health::HealthMetrics;

pub struct HealthCommand {
    pub agent: Option<String>,
    pub json: bool,
}

impl HealthCommand {
    pub fn new(agent: Option<String>) -> Self {
        Self { agent, json: false }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Command for HealthCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let agents = match &self.agent {
            Some(agent) => vec![agent.clone()],
            None => ctx.profiles.names().await,
        };

        if agents.is_empty() {
            println!("📋 No agents configured for recovery");
            println!("   💡 Name an agent: society health <agent>");
            return Ok(());
        }

        let mut reports = Vec::with_capacity(agents.len());
        for agent in &agents {
            let metrics = ctx.health.compute_health(agent).await?;
            let need = ctx.health.needs_recovery(agent).await?;
            if self.json {
                reports.push(json!({ "metrics": metrics, "verdict": need, "reason": need.reason() }));
            } else {
                print_metrics(&metrics);
                let icon = if need.needs_recovery() { "🚨" } else { "💚" };
                println!("   {icon} {need}");
                println!();
            }
        }

        if self.json {
            return print_json(&reports);
        }
        Ok(())
    }
}

fn print_metrics(metrics: &HealthMetrics) {
    let icon = match metrics.health_score {
        s if s >= 0.8 => "🟢",
        s if s >= 0.5 => "🟡",
        _ => "🔴",
    };
    println!("{icon} {} - health {:.2}", metrics.agent, metrics.health_score);
    println!(
        "   📨 {} messages ({} sent, {} received)",
        metrics.message_count, metrics.sent_count, metrics.received_count
    );
    println!(
        "   ↩️  response rate {:.2}  ❌ error rate {:.2}  😊 satisfaction {:.2}",
        metrics.response_rate, metrics.error_rate, metrics.avg_satisfaction
    );
    match metrics.last_active {
        Some(at) => println!(
            "   🕐 last active {} (inactivity penalty {:.2})",
            at.format("%Y-%m-%d %H:%M:%S"),
            metrics.inactivity_penalty
        ),
        None => println!("   🕐 never active (penalty {:.2})", metrics.inactivity_penalty),
    }
}
