use anyhow::Result;
use clap::Parser;

use society_protocol::cli::commands::{
    agents::AgentsCommand,
    fuse::{FuseCommand, FusionStatusCommand},
    health::HealthCommand,
    messages::MessagesCommand,
    recover::{HistoryCommand, RecoverCommand},
    send::SendCommand,
    show_how_to_start,
    watch::WatchCommand,
    Command,
};
use society_protocol::cli::{Cli, Commands};
use society_protocol::{init_telemetry, AppContext, SocietyConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return show_how_to_start().await;
    };

    SocietyConfig::load_env_file()?;
    let config = SocietyConfig::load(cli.config.as_deref())?;
    init_telemetry(&config.observability)?;

    let ctx = AppContext::build(config).await?;
    let json = cli.json;

    let result = match command {
        Commands::Send {
            from,
            to,
            intent,
            priority,
            payload,
        } => {
            SendCommand::new(from, to, intent, payload)
                .with_priority(priority)
                .with_json(json)
                .execute(&ctx)
                .await
        }
        Commands::Messages {
            agent,
            status,
            limit,
        } => {
            MessagesCommand::new(agent)
                .with_status(status)
                .with_limit(limit)
                .with_json(json)
                .execute(&ctx)
                .await
        }
        Commands::Fuse {
            requester,
            agents,
            query,
            context,
            timeout,
            wait,
        } => {
            FuseCommand::new(requester, agents, query)
                .with_context(context)
                .with_timeout(timeout)
                .with_wait(wait)
                .with_json(json)
                .execute(&ctx)
                .await
        }
        Commands::FusionStatus { fusion_id } => {
            FusionStatusCommand::new(fusion_id)
                .with_json(json)
                .execute(&ctx)
                .await
        }
        Commands::Health { agent } => HealthCommand::new(agent).with_json(json).execute(&ctx).await,
        Commands::Recover { agent, force } => {
            RecoverCommand::new(agent)
                .with_force(force)
                .with_json(json)
                .execute(&ctx)
                .await
        }
        Commands::History { agent, limit } => {
            HistoryCommand::new(agent, limit)
                .with_json(json)
                .execute(&ctx)
                .await
        }
        Commands::Agents => AgentsCommand::new().with_json(json).execute(&ctx).await,
        // Watch shuts the context down itself
        Commands::Watch { interval } => {
            return WatchCommand::new()
                .with_interval_secs(interval)
                .execute(&ctx)
                .await;
        }
    };

    ctx.shutdown().await?;
    result
}
