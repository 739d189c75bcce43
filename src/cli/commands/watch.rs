use anyhow::Result;
use std::time::Duration;
use tracing::info;

use super::recover::print_outcome;
use super::Command;
use crate::context::AppContext;
use crate::shutdown::wait_for_signal;

/// Long-running supervisor: sweeps every profiled agent on an interval
/// until Ctrl-C
pub struct WatchCommand {
    pub interval: Option<Duration>,
}

impl WatchCommand {
    pub fn new() -> Self {
        Self { interval: None }
    }

    pub fn with_interval_secs(mut self, secs: Option<u64>) -> Self {
        self.interval = secs.map(Duration::from_secs);
        self
    }
}

impl Default for WatchCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for WatchCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let period = self
            .interval
            .unwrap_or(Duration::from_secs(ctx.config.recovery.sweep_interval_secs))
            .max(Duration::from_secs(1));
        println!("👀 Watching {} profiled agents every {:?} (Ctrl-C to stop)", ctx.profiles.names().await.len(), period);

        let mut ticker = tokio::time::interval(period);
        let signal = wait_for_signal();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                result = &mut signal => {
                    result?;
                    break;
                }
                _ = ticker.tick() => {
                    let outcomes = ctx.recovery.sweep().await;
                    info!(checked = outcomes.len(), "Sweep finished");
                    for outcome in outcomes.iter().filter(|o| !o.was_noop()) {
                        print_outcome(outcome);
                    }
                }
            }
        }

        ctx.shutdown().await
    }
}
