mod cli;
mod terminal;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use flightdeck_cli::{ClientError, QueryClient};

use crate::cli::{CliArgs, Command};
use crate::terminal::Terminal;

async fn run(args: CliArgs, terminal: &Terminal) -> Result<()> {
    let mut client = QueryClient::connect(&args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    info!(server = %args.server, "connected");

    match args.command {
        Command::List => {
            let datasets = client.list_datasets().await?;
            terminal.print_datasets(&datasets)?;
        }
        Command::Describe { name } => {
            let dataset = client.describe(&name).await?;
            terminal.print_dataset(&dataset)?;
        }
        Command::Query { plan_file, keep } => {
            let plan = std::fs::read(&plan_file)
                .with_context(|| format!("failed to read plan {}", plan_file.display()))?;
            let (submission, result) = client.query(plan, keep).await?;
            terminal.print_submission(&submission)?;
            terminal.print_result(&result)?;
            if keep {
                terminal.print_ticket(&submission)?;
            }
        }
        Command::Fetch { ticket } => {
            let result = client.fetch(ticket.into_bytes()).await?;
            terminal.print_result(&result)?;
        }
        Command::Release { ticket } => {
            client.release(ticket.into_bytes()).await?;
            println!("released");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let terminal = Terminal::new();

    if let Err(e) = run(args, &terminal).await {
        // show the server's diagnostic on its own for rejected queries
        let message = match e.downcast_ref::<ClientError>() {
            Some(ClientError::Rejected(diagnostic)) => diagnostic.clone(),
            _ => format!("{e:#}"),
        };
        terminal.print_error(&message)?;
        std::process::exit(1);
    }
    Ok(())
}
