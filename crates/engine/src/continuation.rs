//! Deferred plugin continuations for a single task.

use std::{fmt, sync::Arc};

use {
    serde_json::Value,
    switchyard_plugins::{PluginAction, PluginStats},
};

/// A callback registered by a successful action.
#[derive(Clone)]
pub struct Continuation {
    pub plugin: String,
    pub state: Value,
    pub action: Arc<dyn PluginAction>,
    pub stats: Arc<PluginStats>,
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("plugin", &self.plugin)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Continuations registered during one run of a plan. Owned by that run,
/// so a cancelled run takes its pending callbacks with it.
#[derive(Debug, Default)]
pub struct Continuations {
    pending: Vec<Continuation>,
}

impl Continuations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `continuation.plugin` already registered one.
    pub fn register(&mut self, continuation: Continuation) -> bool {
        if self.pending.iter().any(|c| c.plugin == continuation.plugin) {
            return false;
        }
        self.pending.push(continuation);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl IntoIterator for Continuations {
    type IntoIter = std::vec::IntoIter<Continuation>;
    type Item = Continuation;

    /// Registration order.
    fn into_iter(self) -> Self::IntoIter {
        self.pending.into_iter()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        switchyard_plugins::{ActionContext, PluginError, PluginOutput},
    };

    struct Noop;

    #[async_trait]
    impl PluginAction for Noop {
        async fn run(&self, _cx: &ActionContext<'_>) -> Result<PluginOutput, PluginError> {
            Ok(PluginOutput::default())
        }
    }

    fn continuation(plugin: &str) -> Continuation {
        Continuation {
            plugin: plugin.into(),
            state: Value::Null,
            action: Arc::new(Noop),
            stats: Arc::new(PluginStats::new()),
        }
    }

    #[test]
    fn one_continuation_per_plugin() {
        let mut pending = Continuations::new();
        assert!(pending.register(continuation("a")));
        assert!(!pending.register(continuation("a")));
        assert!(pending.register(continuation("b")));
        assert_eq!(pending.len(), 2);

        let plugins: Vec<_> = pending.into_iter().map(|c| c.plugin).collect();
        assert_eq!(plugins, vec!["a", "b"]);
    }
}
