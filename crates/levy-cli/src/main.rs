//! # levy CLI entry point
//!
//! Parses command-line arguments, connects to the ERP database and
//! dispatches to subcommand handlers.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use levy_cli::listen::run_listen;
use levy_cli::tax::{run_tax, TaxCommand};
use levy_client::{connect, ClientConfig, ListenMode};
use levy_store::PgTaxStore;

/// levy — ERP tax service integration
///
/// Talks to the configured tax service (Avalara AvaTax, or none) using the
/// settings stored in the ERP database.
#[derive(Parser, Debug)]
#[command(name = "levy", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Database URL. Defaults to the DATABASE_URL environment variable.
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(flatten)]
    Tax(TaxCommand),

    /// Serve calculatetax notifications until interrupted.
    Listen,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("levy CLI v{} starting", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let database_url = cli
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .context("DATABASE_URL environment variable is required")?;

    let store = Arc::new(
        PgTaxStore::connect(&database_url)
            .await
            .context("failed to connect to the ERP database")?,
    );
    let client = ClientConfig::from_env();
    tracing::debug!(?client, "client configuration");

    match cli.command {
        Commands::Listen => {
            let mut svc = connect(store, client, ListenMode::Listening).await?;
            run_listen(svc.as_mut()).await
        }
        Commands::Tax(command) => {
            let mut svc = connect(store, client, ListenMode::Direct).await?;
            run_tax(svc.as_mut(), &command).await
        }
    }
}
