//! Main entry point for the placekey CLI

use clap::Parser;
use placekey_client::cli::{Cli, CliError, Commands};
use placekey_client::metrics::init_metrics;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    // Check if JSON output is requested via environment variable
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("placekey_client=info"));

    // Logs go to stderr so stdout carries only results.
    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    if let Some(addr) = cli.metrics_addr {
        init_metrics(addr)
            .await
            .map_err(|e| CliError::MetricsError(e.to_string()))?;
    }

    match &cli.command {
        Commands::Lookup(args) => args.execute(cli).await?,
        Commands::Bulk(args) => args.execute(cli).await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(&cli).await {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}
