//! Stored session state inspection.

use anyhow::{Context, Result};
use colored::Colorize;
use pulse_core::SessionState;
use pulse_sdk::SessionStore;
use std::io::Write;

use crate::cli::StateArgs;
use crate::config::Config;
use crate::store::JsonFileStore;

pub async fn execute(args: StateArgs, config: &Config) -> Result<()> {
    let mut stdout = std::io::stdout();
    run(args, config, &mut stdout).await
}

async fn run(args: StateArgs, config: &Config, out: &mut impl Write) -> Result<()> {
    let config = config.clone().with_args(&args.client);
    let key = config.pulse_config()?.storage_key();
    let store = JsonFileStore::new(&config.state_dir);

    if args.reset {
        store
            .remove(&key)
            .await
            .context("Failed to remove session state")?;
        writeln!(out, "{} {}", "Removed".green(), store.path_for(&key).display())?;
        return Ok(());
    }

    let state = store
        .get(&key)
        .await
        .context("Failed to read session state")?;

    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&state)?)?;
        return Ok(());
    }

    match state {
        Some(state) => print_state(out, &store, &key, &state)?,
        None => writeln!(
            out,
            "{} {}",
            "No session state at".yellow(),
            store.path_for(&key).display()
        )?,
    }
    Ok(())
}

fn print_state(
    out: &mut impl Write,
    store: &JsonFileStore,
    key: &str,
    state: &SessionState,
) -> std::io::Result<()> {
    fn show<T: std::fmt::Display>(value: Option<T>) -> String {
        value
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".dimmed().to_string())
    }

    writeln!(out, "{}", "Session State".bold())?;
    writeln!(out, "  {:<18} {}", "File:".cyan(), store.path_for(key).display())?;
    writeln!(out, "  {:<18} {}", "Session:".cyan(), show(state.session_id))?;
    writeln!(out, "  {:<18} {}", "Last event time:".cyan(), show(state.last_event_time))?;
    writeln!(out, "  {:<18} {}", "Last event id:".cyan(), state.last_event_id)?;
    writeln!(out, "  {:<18} {}ms", "Timeout:".cyan(), state.session_timeout_ms)?;
    writeln!(out, "  {:<18} {}", "Session events:".cyan(), state.tracking_session_events)?;
    writeln!(out, "  {:<18} {}", "Opted out:".cyan(), state.opt_out)?;
    writeln!(out, "  {:<18} {}", "User:".cyan(), show(state.user_id.as_deref()))?;
    writeln!(out, "  {:<18} {}", "Device:".cyan(), show(state.device_id.as_deref()))?;
    Ok(())
}
