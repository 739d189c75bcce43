use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::context::AppContext;

pub mod agents;
pub mod fuse;
pub mod health;
pub mod messages;
pub mod recover;
pub mod send;
pub mod watch;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self, ctx: &AppContext) -> Result<()>;
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// JSON if it parses, otherwise the raw text as a string
pub(crate) fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub async fn show_how_to_start() -> Result<()> {
    println!("🤝 Society Protocol - agent coordination");
    println!();
    println!("To get started:");
    println!("  📨 society send --from A --to B '\"hello\"'   # Send a message");
    println!("  📬 society messages <agent>                  # Inspect an agent's traffic");
    println!("  🧠 society fuse --agents A,B --wait '<query>' # Fuse answers from several agents");
    println!("  🩺 society health [agent]                    # Health score and verdict");
    println!();
    println!("Admin commands:");
    println!("  🛠️  society recover <agent> [--force]         # Backup, restore and restart");
    println!("  👀 society watch                             # Sweep profiled agents periodically");
    println!();
    println!("💡 Agents under recovery are configured in society.toml under [[recovery.agents]]");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_parsing() {
        assert_eq!(parse_payload(r#"{"k": 1}"#), json!({"k": 1}));
        assert_eq!(parse_payload("do the thing"), json!("do the thing"));
    }
}
