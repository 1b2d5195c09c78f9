//! CLI argument definitions using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Pulse event pipeline CLI
///
/// Replays event logs through session tracking and inspects stored state.
#[derive(Parser, Debug)]
#[command(name = "pulse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a JSON-lines event log and print the annotated events
    Replay(ReplayArgs),

    /// Show or reset the stored session state
    State(StateArgs),

    /// Show version
    Version,
}

/// Overrides shared by every command that touches session state.
#[derive(Args, Debug, Clone, Default)]
pub struct ClientArgs {
    /// Directory holding session state files
    #[arg(long, value_name = "DIR")]
    pub state: Option<PathBuf>,

    /// API key (also read from PULSE_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Instance name
    #[arg(long)]
    pub instance: Option<String>,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// JSON-lines file with events and control records
    pub file: PathBuf,

    #[command(flatten)]
    pub client: ClientArgs,

    /// Session timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<i64>,

    /// Emit session_start / session_end events
    #[arg(long)]
    pub track_sessions: bool,
}

#[derive(Args, Debug)]
pub struct StateArgs {
    #[command(flatten)]
    pub client: ClientArgs,

    /// Delete the stored state
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}
