//! Startup registration from one or more descriptor sources.
//!
//! The registry does not know where descriptors come from. A process
//! composes a fixed manifest (the bundled plugins) with any extension
//! sources and registers everything once, in source order.

use {
    switchyard_config::PluginsConfig,
    tracing::{debug, info},
};

use crate::{descriptor::PluginDescriptor, error::RegistryError, registry::PluginRegistry};

/// Provides plugin descriptors at startup.
pub trait PluginSource {
    fn name(&self) -> &str;

    fn descriptors(&self) -> Vec<PluginDescriptor>;
}

/// A fixed list of descriptors.
pub struct StaticSource {
    name: String,
    descriptors: Vec<PluginDescriptor>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, descriptors: Vec<PluginDescriptor>) -> Self {
        Self {
            name: name.into(),
            descriptors,
        }
    }
}

impl PluginSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.descriptors.clone()
    }
}

/// Register every descriptor from `sources` in order, skipping the names
/// listed in `config.disabled`. Stops at the first registration error.
pub fn load_plugins(
    registry: &mut PluginRegistry,
    sources: &[&dyn PluginSource],
    config: &PluginsConfig,
) -> Result<usize, RegistryError> {
    let mut loaded = 0;
    for source in sources {
        for descriptor in source.descriptors() {
            if config.is_disabled(&descriptor.name) {
                debug!(source = source.name(), plugin = %descriptor.name, "plugin disabled by config");
                continue;
            }
            registry.register(descriptor)?;
            loaded += 1;
        }
    }
    info!(loaded, total = registry.len(), "plugins loaded");
    Ok(loaded)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            action::{ActionContext, PluginAction, PluginOutput},
            error::PluginError,
        },
        async_trait::async_trait,
    };

    struct Noop;

    #[async_trait]
    impl PluginAction for Noop {
        async fn run(&self, _cx: &ActionContext<'_>) -> Result<PluginOutput, PluginError> {
            Ok(PluginOutput::default())
        }
    }

    #[test]
    fn sources_register_in_order_and_honor_disabled() {
        let manifest = StaticSource::new("bundled", vec![
            PluginDescriptor::trigger("a", Noop),
            PluginDescriptor::trigger("b", Noop),
        ]);
        let extensions = StaticSource::new("ext", vec![PluginDescriptor::trigger("c", Noop)]);
        let config = PluginsConfig {
            disabled: vec!["b".into()],
            ..Default::default()
        };

        let mut registry = PluginRegistry::default();
        let loaded = load_plugins(&mut registry, &[&manifest, &extensions], &config).unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(registry.get("c").unwrap().order, 1);
        assert!(registry.get("b").is_none());
    }

    #[test]
    fn duplicate_across_sources_fails() {
        let a = StaticSource::new("one", vec![PluginDescriptor::trigger("x", Noop)]);
        let b = StaticSource::new("two", vec![PluginDescriptor::trigger("x", Noop)]);
        let mut registry = PluginRegistry::default();
        assert!(matches!(
            load_plugins(&mut registry, &[&a, &b], &PluginsConfig::default()),
            Err(RegistryError::DuplicateName { .. })
        ));
    }
}
