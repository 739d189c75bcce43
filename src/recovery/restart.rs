use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// How an agent is brought back once its artifacts are in place.
/// `Err` means the restart failed; the orchestrator records the message.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RestartProcedure: Send + Sync {
    async fn restart(&self, agent: &str) -> anyhow::Result<()>;
}

/// Runs a configured program and treats a zero exit status as success
#[derive(Debug, Clone)]
pub struct CommandRestart {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRestart {
    /// `None` if `command` is empty
    pub fn from_command(command: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }
}

#[async_trait]
impl RestartProcedure for CommandRestart {
    async fn restart(&self, agent: &str) -> anyhow::Result<()> {
        debug!(agent = %agent, program = %self.program, args = ?self.args, "Running restart command");

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.program)
                .args(&self.args)
                .env("SOCIETY_AGENT", agent)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("restart command timed out after {:?}", self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "restart command exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        info!(agent = %agent, program = %self.program, "Restart command succeeded");
        Ok(())
    }
}

/// For agents that need no process restart once their files are restored
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRestart;

#[async_trait]
impl RestartProcedure for NoopRestart {
    async fn restart(&self, agent: &str) -> anyhow::Result<()> {
        debug!(agent = %agent, "No restart procedure configured");
        Ok(())
    }
}
