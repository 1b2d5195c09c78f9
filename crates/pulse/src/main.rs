//! pulse - Event Log Replay CLI
//!
//! Replays JSON-lines event logs through the Pulse session pipeline and
//! inspects the session state stored between runs.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;
mod config;
mod store;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Annotated events go to stdout; logs stay on stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("pulse=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = config::Config::load()?;

    match cli.command {
        Commands::Replay(args) => commands::replay::execute(args, &config).await,
        Commands::State(args) => commands::state::execute(args, &config).await,
        Commands::Version => {
            println!("pulse {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
