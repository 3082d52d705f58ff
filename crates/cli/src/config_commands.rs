use std::path::{Path, PathBuf};

use {anyhow::Result, clap::Subcommand, switchyard_config::SwitchyardConfig};

use crate::runtime;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report the first problem.
    Check,
    /// Print the effective configuration as JSON.
    Show,
}

pub async fn handle_config(config_path: Option<&Path>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check => check(config_path),
        ConfigAction::Show => {
            let config = runtime::load(config_path)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        },
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config_path: Option<&Path>) -> Result<()> {
    let path: Option<PathBuf> = config_path
        .map(Path::to_path_buf)
        .or_else(switchyard_config::find_config_file);
    match &path {
        Some(path) => eprintln!("Checking {}\n", path.display()),
        None => eprintln!("No config file found; checking defaults.\n"),
    }

    match runtime::load(path.as_deref()) {
        Ok(config) => {
            eprintln!("  {BOLD}{GREEN}ok{RESET} {}", summary(&config));
            eprintln!("\nNo issues found.");
            Ok(())
        },
        Err(e) => {
            eprintln!("  {BOLD}{RED}error{RESET} {e}");
            eprintln!();
            std::process::exit(1);
        },
    }
}

fn summary(config: &SwitchyardConfig) -> String {
    format!(
        "{} -> {}, {} channel(s), {} schedule(s), {} consumer(s) per role",
        config.queue.inbound_queue,
        config.queue.outbound_queue,
        config.channels.len(),
        config.schedules.len(),
        config.worker.concurrency,
    )
}
