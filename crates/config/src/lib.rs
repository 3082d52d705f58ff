//! Configuration loading, validation, env substitution and the startup env snapshot.
//!
//! Config files: `switchyard.toml`, `switchyard.yaml`, or `switchyard.json`
//! Searched in `./` then `~/.config/switchyard/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values. Configuration is
//! read once at process start; nothing re-reads it while tasks are running.

pub mod env;
pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    env::EnvSnapshot,
    error::{Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config, parse_config},
    schema::{
        ChannelBehavior, ChannelKind, ChunkingConfig, CompletionConfig, DedupeConfig,
        PluginsConfig, QueueConfig, ResponseStyle, ScheduleConfig, SwitchyardConfig, WorkerConfig,
    },
};
