mod config_commands;
mod plugin_commands;
mod run_commands;
mod runtime;

use std::{path::PathBuf, time::Duration};

use {
    clap::{Parser, Subcommand},
    switchyard_protocol::Platform,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::runtime::Role;

#[derive(Parser)]
#[command(name = "switchyard", about = "Switchyard: queue-backed task routing for chat bots")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides the default search locations).
    #[arg(long, global = true, env = "SWITCHYARD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the workers (default).
    Run {
        /// Consumer groups to run in this process. Split roles need a
        /// shared broker and are refused by the in-process one.
        #[arg(long, value_enum, default_value_t = Role::Both)]
        role: Role,
    },
    /// Inspect registered plugins.
    Plugins {
        #[command(subcommand)]
        action: plugin_commands::PluginAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Push one message through the full pipeline and print what is delivered.
    Demo {
        #[arg(long, default_value = "discord")]
        platform: Platform,
        #[arg(long, default_value = "demo-chat")]
        chat: String,
        #[arg(long, default_value = "demo-user")]
        user: String,
        #[arg(long)]
        thread: Option<String>,
        /// Seconds to wait for the pipeline to go idle.
        #[arg(long, default_value_t = 10)]
        timeout: u64,
        text: String,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries command output.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "switchyard starting");

    let config_path = cli.config.as_deref();
    match cli.command {
        None => run_commands::handle_run(config_path, Role::Both).await,
        Some(Commands::Run { role }) => run_commands::handle_run(config_path, role).await,
        Some(Commands::Plugins { action }) => {
            plugin_commands::handle_plugins(config_path, action).await
        },
        Some(Commands::Config { action }) => {
            config_commands::handle_config(config_path, action).await
        },
        Some(Commands::Demo {
            platform,
            chat,
            user,
            thread,
            timeout,
            text,
        }) => {
            run_commands::handle_demo(config_path, run_commands::DemoArgs {
                platform,
                chat,
                user,
                thread,
                text,
                timeout: Duration::from_secs(timeout),
            })
            .await
        },
    }
}
