use std::{fmt, sync::Arc};

use {serde::Serialize, switchyard_protocol::Task};

use crate::{action::PluginAction, hook::TaskHook};

/// Where in the pipeline a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Receiver side, before triggers are planned.
    Inbound,
    /// Result sink, before a task is handed to the sender queue.
    Outbound,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("inbound"),
            Self::Outbound => f.write_str("outbound"),
        }
    }
}

/// What a plugin contributes.
#[derive(Clone)]
pub enum Capability {
    /// An action added to the execution plan.
    Trigger {
        action: Arc<dyn PluginAction>,
        /// Triggers sharing a group fill a single slot per task.
        exclusive: Option<String>,
    },
    /// An observer that may transform the task or stop the pipeline.
    Hook(Arc<dyn TaskHook>),
}

type Predicate = Arc<dyn Fn(&Task) -> bool + Send + Sync>;

/// Static registration record.
#[derive(Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub description: String,
    /// Lower runs earlier; ties keep registration order.
    pub priority: i32,
    /// Keys that must be present in the env snapshot, or the plugin is
    /// skipped.
    pub required_env: Vec<String>,
    pub capability: Capability,
    predicate: Predicate,
}

impl PluginDescriptor {
    fn new(name: impl Into<String>, capability: Capability) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            priority: 0,
            required_env: Vec::new(),
            capability,
            predicate: Arc::new(|_| true),
        }
    }

    /// A trigger matching every task until [`matching`](Self::matching) narrows it.
    pub fn trigger(name: impl Into<String>, action: impl PluginAction + 'static) -> Self {
        Self::new(name, Capability::Trigger {
            action: Arc::new(action),
            exclusive: None,
        })
    }

    pub fn hook(name: impl Into<String>, hook: impl TaskHook + 'static) -> Self {
        Self::new(name, Capability::Hook(Arc::new(hook)))
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the trigger predicate. Must be pure: no I/O, no blocking.
    #[must_use]
    pub fn matching(mut self, predicate: impl Fn(&Task) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Arc::new(predicate);
        self
    }

    #[must_use]
    pub fn requires_env<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_env.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Put a trigger into an exclusive group. No effect on hooks.
    #[must_use]
    pub fn exclusive(mut self, group: impl Into<String>) -> Self {
        if let Capability::Trigger { exclusive, .. } = &mut self.capability {
            *exclusive = Some(group.into());
        }
        self
    }

    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        (self.predicate)(task)
    }

    #[must_use]
    pub fn is_hook(&self) -> bool {
        matches!(self.capability, Capability::Hook(_))
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self.capability {
            Capability::Trigger { .. } => "trigger",
            Capability::Hook(_) => "hook",
        }
    }

    #[must_use]
    pub fn exclusive_group(&self) -> Option<&str> {
        match &self.capability {
            Capability::Trigger { exclusive, .. } => exclusive.as_deref(),
            Capability::Hook(_) => None,
        }
    }

    /// Stages this plugin takes part in. Triggers only run inbound.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        match &self.capability {
            Capability::Trigger { .. } => &[Stage::Inbound],
            Capability::Hook(hook) => hook.stages(),
        }
    }

    #[must_use]
    pub fn runs_in(&self, stage: Stage) -> bool {
        self.stages().contains(&stage)
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("priority", &self.priority)
            .field("required_env", &self.required_env)
            .field("exclusive", &self.exclusive_group())
            .finish_non_exhaustive()
    }
}
