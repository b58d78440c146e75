//! Ingestion control CLI
//!
//! One-off operator commands that sit alongside the daemon: currently just
//! `backfill`, for walking a mailbox's full history into the downstream
//! queue outside the regular push/delta-sweep paths.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::backfill::BackfillCommand;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "ingestctl", version, about = "Email ingestion subsystem control CLI")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Walk a mailbox's full history into the downstream queue
    Backfill(BackfillCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    let format = if cli.json { OutputFormat::Json } else { OutputFormat::Human };

    match cli.command {
        Commands::Backfill(cmd) => cmd.execute(format).await,
    }
}
