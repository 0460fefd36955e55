mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;
use walletbridge::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // chromiumoxide logs every CDP event it cannot deserialize; keep those quiet
    let level = if cli.verbose { "info,walletbridge=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},chromiumoxide::conn=warn,chromiumoxide::handler=warn",
            level
        ))
    });

    // stdout carries command output (and --json)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli.run().await
}
