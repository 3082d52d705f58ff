use std::sync::Arc;

use {
    switchyard_config::EnvSnapshot,
    switchyard_protocol::Task,
    tracing::{debug, info},
};

use crate::{
    descriptor::{PluginDescriptor, Stage},
    eligibility::{Eligibility, check_eligibility},
    error::RegistryError,
    stats::PluginStats,
};

/// A descriptor plus what the registry learned about it at registration.
#[derive(Debug)]
pub struct RegisteredPlugin {
    pub descriptor: PluginDescriptor,
    /// Position in registration order; breaks priority ties.
    pub order: usize,
    pub eligibility: Eligibility,
    pub stats: Arc<PluginStats>,
}

impl RegisteredPlugin {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Installed plugins, kept sorted by `(priority, registration order)`.
///
/// Built during startup, then shared behind an `Arc` and never mutated, so
/// [`matching`](Self::matching) needs no lock.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    env: EnvSnapshot,
    entries: Vec<RegisteredPlugin>,
    registered: usize,
}

impl PluginRegistry {
    pub fn new(env: EnvSnapshot) -> Self {
        Self {
            env,
            entries: Vec::new(),
            registered: 0,
        }
    }

    pub fn register(&mut self, descriptor: PluginDescriptor) -> Result<(), RegistryError> {
        if descriptor.name.is_empty() {
            return Err(RegistryError::invalid("", "name must not be empty"));
        }
        if self.get(&descriptor.name).is_some() {
            return Err(RegistryError::duplicate(&descriptor.name));
        }
        if descriptor.stages().is_empty() {
            return Err(RegistryError::invalid(
                &descriptor.name,
                "hook declares no stages",
            ));
        }

        let eligibility = check_eligibility(&descriptor, &self.env);
        if eligibility.eligible {
            debug!(
                plugin = %descriptor.name,
                kind = descriptor.kind(),
                priority = descriptor.priority,
                "plugin registered"
            );
        } else {
            info!(
                plugin = %descriptor.name,
                missing_env = ?eligibility.missing_env,
                "plugin registered but disabled"
            );
        }

        // Insert after every entry with priority <= ours: stable ordering.
        let at = self
            .entries
            .partition_point(|e| e.descriptor.priority <= descriptor.priority);
        self.entries.insert(at, RegisteredPlugin {
            descriptor,
            order: self.registered,
            eligibility,
            stats: Arc::new(PluginStats::new()),
        });
        self.registered += 1;
        Ok(())
    }

    /// Eligible plugins in `stage` whose predicate accepts `task`, in
    /// `(priority, registration order)`.
    pub fn matching(&self, task: &Task, stage: Stage) -> Vec<&RegisteredPlugin> {
        self.entries
            .iter()
            .filter(|e| e.eligibility.eligible)
            .filter(|e| e.descriptor.runs_in(stage))
            .filter(|e| e.descriptor.matches(task))
            .collect()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredPlugin> {
        self.entries.iter().find(|e| e.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredPlugin> {
        self.entries.iter()
    }

    #[must_use]
    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
