//! Plugins shipped with switchyard.
//!
//! Priorities: channel gate 5, deep research 10, channel decoration 20,
//! chunker 50, completion 100. Deep research and completion share the
//! [`RESPONDER_GROUP`], so one task gets at most one of them.

use std::sync::Arc;

use switchyard_config::SwitchyardConfig;

use crate::{completion::CompletionClient, source::StaticSource};

pub mod channel_behavior;
pub mod chunker;
pub mod completion;
pub mod deep_research;

/// Exclusive group of the plugins that answer the user.
pub const RESPONDER_GROUP: &str = "responder";

/// The bundled manifest, configured from `config`.
pub fn bundled_source(config: &SwitchyardConfig, client: Arc<dyn CompletionClient>) -> StaticSource {
    let channels = Arc::new(config.channels.clone());
    StaticSource::new("bundled", vec![
        channel_behavior::gate_descriptor(Arc::clone(&channels)),
        channel_behavior::decoration_descriptor(channels),
        chunker::descriptor(config.chunking.clone()),
        deep_research::descriptor(),
        completion::descriptor(client, &config.plugins.completion),
    ])
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{completion::EchoCompletionClient, registry::PluginRegistry, source::load_plugins},
        switchyard_config::EnvSnapshot,
    };

    #[test]
    fn manifest_registers_cleanly() {
        let config = SwitchyardConfig::default();
        let source = bundled_source(&config, Arc::new(EchoCompletionClient));
        let mut registry = PluginRegistry::new(EnvSnapshot::from_pairs([("LLM_API_KEY", "k")]));
        let loaded = load_plugins(&mut registry, &[&source], &config.plugins).unwrap();
        assert_eq!(loaded, 5);
        let order: Vec<_> = registry.iter().map(|e| e.name().to_string()).collect();
        assert_eq!(order, vec![
            "channel_behavior",
            "deep_research",
            "channel_decoration",
            "chunker",
            "completion"
        ]);
        assert!(registry.iter().all(|e| e.eligibility.eligible));
    }

    #[test]
    fn completion_disabled_without_key() {
        let config = SwitchyardConfig::default();
        let source = bundled_source(&config, Arc::new(EchoCompletionClient));
        let mut registry = PluginRegistry::new(EnvSnapshot::default());
        load_plugins(&mut registry, &[&source], &config.plugins).unwrap();
        let completion = registry.get("completion").unwrap();
        assert_eq!(completion.eligibility.missing_env, vec!["LLM_API_KEY".to_string()]);
    }
}
