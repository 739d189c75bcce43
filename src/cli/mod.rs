use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::bus::{Intent, MessageStatus};

pub mod commands;

#[derive(Parser)]
#[command(name = "society")]
#[command(about = "Coordination substrate for a society of cooperating agents")]
#[command(long_about = "Society routes messages between named agents, fuses one query across \
                       several agents with a guaranteed deadline, and watches agent health, \
                       restoring and restarting agents that fail. Start with 'society agents' \
                       to see who is known.")]
pub struct Cli {
    /// Configuration file (defaults to ./society.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a message from one agent to another
    Send {
        #[arg(long, help = "Sending agent")]
        from: String,
        #[arg(long, help = "Receiving agent")]
        to: String,
        #[arg(long, default_value = "task", help = "Message intent, e.g. task or fusion_request")]
        intent: Intent,
        #[arg(long, default_value = "1", help = "Priority 1 (low) to 5 (high); out of range is clamped")]
        priority: i64,
        /// JSON payload; anything that is not JSON is sent as a string
        payload: String,
    },
    /// List messages an agent sent or received, newest first
    Messages {
        agent: String,
        #[arg(long, help = "Only messages with this status: sent, delivered, processed, error")]
        status: Option<MessageStatus>,
        #[arg(long, default_value = "20", help = "Maximum number of messages to show")]
        limit: usize,
    },
    /// Ask several agents the same question and fuse their answers
    Fuse {
        #[arg(long, default_value = "CLI", help = "Agent that receives the fused answer")]
        requester: String,
        #[arg(long, value_delimiter = ',', required = true, help = "Comma-separated participants (at least 2 distinct)")]
        agents: Vec<String>,
        query: String,
        #[arg(long, help = "JSON context forwarded to participants")]
        context: Option<String>,
        #[arg(long, help = "Seconds before missing answers are filled with placeholders")]
        timeout: Option<u64>,
        #[arg(long, help = "Block until the fusion finishes and print the combined answer")]
        wait: bool,
    },
    /// Show whether a fusion is pending, completed or unknown
    FusionStatus { fusion_id: String },
    /// Compute health metrics and the recovery verdict
    Health {
        /// Agent to inspect; all profiled agents when omitted
        agent: Option<String>,
    },
    /// Recover an agent if it needs it
    Recover {
        agent: String,
        #[arg(long, help = "Recover even when healthy or halted by the loop breaker")]
        force: bool,
    },
    /// Recovery records for an agent, newest first
    History {
        agent: String,
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// List agents seen in the message log or configured for recovery
    Agents,
    /// Periodically check every profiled agent and recover as needed
    Watch {
        #[arg(long, help = "Seconds between sweeps (defaults to recovery.sweep_interval_secs)")]
        interval: Option<u64>,
    },
}
