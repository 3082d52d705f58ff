//! CLI commands for inspecting the plugin registry.

use std::path::Path;

use {clap::Subcommand, switchyard_plugins::{PluginRegistry, RegisteredPlugin}};

use crate::runtime;

#[derive(Subcommand)]
pub enum PluginAction {
    /// List registered plugins in dispatch order.
    List {
        /// Show only eligible plugins.
        #[arg(long)]
        eligible: bool,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show details about a plugin.
    Info {
        /// Plugin name.
        name: String,
    },
}

pub async fn handle_plugins(config_path: Option<&Path>, action: PluginAction) -> anyhow::Result<()> {
    let config = runtime::load(config_path)?;
    let registry = runtime::build_registry(&config, runtime::completion_client())?;

    match action {
        PluginAction::List { eligible, json } => {
            let entries = list_entries(&registry, eligible);
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            if entries.is_empty() {
                println!("No plugins registered.");
            }
            for plugin in registry.iter().filter(|p| !eligible || p.eligibility.eligible) {
                print_line(plugin);
            }
        },
        PluginAction::Info { name } => {
            let Some(plugin) = registry.get(&name) else {
                anyhow::bail!("plugin '{name}' not found");
            };
            print_info(plugin);
        },
    }
    Ok(())
}

fn list_entries(registry: &PluginRegistry, eligible_only: bool) -> Vec<serde_json::Value> {
    registry
        .iter()
        .filter(|p| !eligible_only || p.eligibility.eligible)
        .map(|p| {
            let d = &p.descriptor;
            serde_json::json!({
                "name": d.name,
                "kind": d.kind(),
                "description": d.description,
                "priority": d.priority,
                "stages": d.stages(),
                "exclusive": d.exclusive_group(),
                "eligible": p.eligibility.eligible,
                "missing_env": p.eligibility.missing_env,
            })
        })
        .collect()
}

fn print_line(plugin: &RegisteredPlugin) {
    let d = &plugin.descriptor;
    let status = if plugin.eligibility.eligible {
        "✓"
    } else {
        "✗"
    };
    println!(
        "  {status} {name} ({kind}, priority {priority}): {desc}",
        name = d.name,
        kind = d.kind(),
        priority = d.priority,
        desc = d.description,
    );
    if !plugin.eligibility.missing_env.is_empty() {
        println!("    ↳ missing env vars: {:?}", plugin.eligibility.missing_env);
    }
}

fn print_info(plugin: &RegisteredPlugin) {
    let d = &plugin.descriptor;
    let stats = plugin.stats.snapshot();
    println!("Name:        {}", d.name);
    println!("Description: {}", d.description);
    println!("Kind:        {}", d.kind());
    println!("Priority:    {}", d.priority);
    println!(
        "Stages:      {}",
        d.stages()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    if let Some(group) = d.exclusive_group() {
        println!("Exclusive:   {group}");
    }
    if !d.required_env.is_empty() {
        println!("Requires:    {}", d.required_env.join(", "));
    }
    println!("Eligible:    {}", plugin.eligibility.eligible);
    if !plugin.eligibility.missing_env.is_empty() {
        println!("  Missing env: {:?}", plugin.eligibility.missing_env);
    }
    println!("Calls:       {} ({} failed)", stats.calls, stats.failures);
}
