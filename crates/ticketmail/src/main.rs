//! `ticketmail` - mail daemon for the ticket desk.
//!
//! Subcommands:
//!
//! - `ticketmail run` -- run the sync timer until interrupted.
//! - `ticketmail sync` -- run one manual sync pass.
//! - `ticketmail send-test` -- send a test message through the relay.
//! - `ticketmail status` -- show the checkpoint and recent sync runs.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod desk;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ticketmail_core::OutboundMessage;
use ticketmail_core::sync::{RunSummary, Trigger, TriggerResult};

use desk::Desk;

/// Ticket desk mail daemon.
#[derive(Parser)]
#[command(name = "ticketmail", about = "Ticket desk mail daemon", version)]
struct Cli {
    /// Configuration file (defaults to the per-user config directory).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync timer until Ctrl-C.
    Run,

    /// Run one sync pass now.
    Sync,

    /// Send a test message to check the SMTP settings.
    SendTest {
        /// Recipient address.
        address: String,
    },

    /// Show the sync checkpoint and recent runs.
    Status {
        /// Number of sync log entries to show.
        #[arg(long, default_value = "10")]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "ticketmail=debug,ticketmail_core=debug,ticketmail_imap=debug,ticketmail_smtp=debug"
    } else {
        "ticketmail=info,ticketmail_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let desk = Desk::open(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Run => run(&desk).await,
        Commands::Sync => sync_once(&desk).await,
        Commands::SendTest { address } => send_test(&desk, &address).await,
        Commands::Status { limit } => status(&desk, limit).await,
    }
}

async fn run(desk: &Desk) -> anyhow::Result<ExitCode> {
    if !desk.config.imap.is_configured() {
        anyhow::bail!("IMAP settings are incomplete, nothing to sync");
    }
    desk.scheduler.start();
    info!("ticketmail running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutting down");
    desk.scheduler.shutdown().await;
    Ok(ExitCode::SUCCESS)
}

async fn sync_once(desk: &Desk) -> anyhow::Result<ExitCode> {
    if !desk.config.imap.is_configured() {
        anyhow::bail!("IMAP settings are incomplete, nothing to sync");
    }
    match desk.scheduler.trigger(Trigger::Manual).await {
        TriggerResult::Completed(summary) => {
            print_summary(&summary);
            Ok(if summary.errors.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        TriggerResult::InProgress => {
            println!("A sync run is already in progress.");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn send_test(desk: &Desk, address: &str) -> anyhow::Result<ExitCode> {
    let message = OutboundMessage::new(
        [address],
        "Ticket desk test message",
        "This is a test message from the ticket desk mail daemon.\n",
    );
    let outcome = desk.dispatcher.deliver("test", &message).await;
    match &outcome.error {
        None => println!("Sent to {address}."),
        Some(error) => println!("{}: {error}", outcome.status.as_str()),
    }
    Ok(if outcome.is_sent() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn status(desk: &Desk, limit: u32) -> anyhow::Result<ExitCode> {
    let status = desk.scheduler.status().await;
    match status.checkpoint {
        Some(checkpoint) => println!("Checkpoint: {}", checkpoint.to_rfc3339()),
        None => println!("Checkpoint: never synced"),
    }

    let entries = desk.store.recent_sync_log(limit).await?;
    if entries.is_empty() {
        println!("No sync runs recorded.");
    }
    for entry in entries {
        println!(
            "{}  {:<8} {:<22} processed={} skipped={} inserted={} errors={}",
            entry.started_at.format("%Y-%m-%d %H:%M:%S"),
            entry.trigger,
            entry.outcome,
            entry.processed,
            entry.skipped,
            entry.inserted,
            entry.errors.len()
        );
        for error in &entry.errors {
            println!("    {error}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} after {} attempt(s): processed={} skipped={} inserted={}",
        summary.outcome.as_str(),
        summary.attempts,
        summary.processed,
        summary.skipped,
        summary.inserted
    );
    println!("Window start: {}", summary.window_start.to_rfc3339());
    for error in &summary.errors {
        println!("  error: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_send_test() {
        let cli = Cli::parse_from(["ticketmail", "--config", "desk.json", "send-test", "a@example.com"]);
        assert_eq!(cli.config, Some(PathBuf::from("desk.json")));
        assert!(matches!(cli.command, Commands::SendTest { address } if address == "a@example.com"));
    }

    #[test]
    fn status_limit_defaults_to_ten() {
        let cli = Cli::parse_from(["ticketmail", "status"]);
        assert!(matches!(cli.command, Commands::Status { limit: 10 }));
    }
}
