//! Ticket Surge CLI
//!
//! Command-line interface for load testing the ticket service.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use ticket_surge::cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging, RUST_LOG wins over --verbose
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())),
        )
        .with_writer(std::io::stderr)
        .init();

    cli.run().await
}
