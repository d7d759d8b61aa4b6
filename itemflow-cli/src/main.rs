mod cli;

use anyhow::Result;
use clap::Parser;
use cli::commands::Commands;
use cli::context::{GlobalArgs, HostContext};
use cli::handlers;
use itemflow_core::services::log_error;

#[derive(Parser)]
#[command(name = "itemflow")]
#[command(version = "0.1.0")]
#[command(about = "Move content items through repository-defined workflows")]
#[command(
    help_template = "{name} - {version}\n{about}\n\n{usage-heading}\n  {usage}\n\n{all-args}{options}\n"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let host = HostContext::load(&cli.global)?;

    if let Err(e) = run(cli, &host).await {
        log_error(&format!("{:#}", e), Some("itemflow"));
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli, host: &HostContext) -> Result<()> {
    let json = cli.global.json;

    match cli.command {
        Commands::Workflows => handlers::handle_workflows(host, json).await?,
        Commands::States { workflow } => handlers::handle_states(host, &workflow, json).await?,
        Commands::Start {
            workflow,
            item,
            version,
        } => {
            handlers::handle_start(host, &workflow, &item, version, json).await?;
        }
        Commands::State { item, version } => {
            handlers::handle_state(host, &item, version, json).await?;
        }
        Commands::Commands { item, version } => {
            handlers::handle_commands(host, &item, version, json).await?;
        }
        Commands::Execute {
            item,
            command,
            version,
            comment,
            param,
            callback,
            payload,
        } => {
            let options = handlers::ExecuteOptions {
                comment,
                params: param,
                callback,
                payload,
            };
            handlers::handle_execute(host, &item, version, &command, options, json).await?;
        }
        Commands::Resume { token } => handlers::handle_resume(host, &token, json).await?,
        Commands::Pending => handlers::handle_pending(host, json).await?,
        Commands::History { item, version } => {
            handlers::handle_history(host, &item, version, json).await?;
        }
        Commands::Approved {
            item,
            version,
            target,
        } => {
            handlers::handle_approved(host, &item, version, target.as_deref(), json).await?;
        }
        Commands::Access {
            item,
            right,
            version,
        } => {
            handlers::handle_access(host, &item, version, &right, json).await?;
        }
        Commands::Items { workflow, state } => {
            handlers::handle_items(host, &workflow, &state, json).await?;
        }
        Commands::EndSession => handlers::handle_end_session(host, json).await?,
    }

    Ok(())
}
