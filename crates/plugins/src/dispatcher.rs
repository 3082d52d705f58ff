use std::{
    collections::HashSet,
    fmt,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Instant,
};

use {
    futures::FutureExt,
    switchyard_protocol::Task,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use switchyard_metrics::{counter, labels, plugins as plugin_metrics};

use crate::{
    action::PluginAction,
    descriptor::{Capability, Stage},
    hook::HookAction,
    registry::{PluginRegistry, RegisteredPlugin},
    stats::PluginStats,
};

/// A trigger selected to run.
#[derive(Clone)]
pub struct PlannedStep {
    pub plugin: String,
    pub priority: i32,
    pub action: Arc<dyn PluginAction>,
    pub stats: Arc<PluginStats>,
}

impl fmt::Debug for PlannedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannedStep")
            .field("plugin", &self.plugin)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// A hook ended the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Halt {
    pub plugin: String,
    pub reason: String,
}

/// Per-task plan: the task after inbound hooks, and the triggers to run
/// against it in order.
#[derive(Debug)]
pub struct ExecutionPlan {
    pub task: Task,
    pub steps: Vec<PlannedStep>,
    pub halted: Option<Halt>,
}

impl ExecutionPlan {
    pub fn plugin_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.plugin.as_str()).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Result of running one stage's hooks.
#[derive(Debug)]
pub struct HookOutcome {
    pub task: Task,
    pub halted: Option<Halt>,
}

/// Builds execution plans from a frozen registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Apply inbound hooks in priority order, collecting triggers as they
    /// come. Deterministic for a given registry and task.
    pub async fn plan(&self, task: Task) -> ExecutionPlan {
        self.walk(task, Stage::Inbound).await
    }

    /// Apply the hooks registered for `stage`. Triggers never run here.
    pub async fn run_hooks(&self, task: Task, stage: Stage) -> HookOutcome {
        let plan = self.walk(task, stage).await;
        HookOutcome {
            task: plan.task,
            halted: plan.halted,
        }
    }

    async fn walk(&self, task: Task, stage: Stage) -> ExecutionPlan {
        let matched = self.registry.matching(&task, stage);
        debug!(task_id = %task.id(), %stage, matched = matched.len(), "dispatching task");

        let mut current = task;
        let mut steps = Vec::new();
        let mut filled: HashSet<&str> = HashSet::new();
        let mut halted = None;

        for entry in matched {
            match &entry.descriptor.capability {
                Capability::Hook(hook) => {
                    let start = Instant::now();
                    let result = AssertUnwindSafe(hook.on_task(stage, &current))
                        .catch_unwind()
                        .await;
                    let latency = start.elapsed();
                    let action = match result {
                        Ok(Ok(action)) => {
                            entry.stats.record_success(latency);
                            action
                        },
                        Ok(Err(e)) => {
                            entry.stats.record_failure(latency);
                            warn!(task_id = %current.id(), plugin = entry.name(), %stage, error = %e, "hook failed");
                            continue;
                        },
                        Err(_) => {
                            entry.stats.record_failure(latency);
                            error!(task_id = %current.id(), plugin = entry.name(), %stage, "hook panicked");
                            continue;
                        },
                    };
                    match action {
                        HookAction::Continue => {},
                        HookAction::Replace(next) => {
                            current = accept_replacement(entry, current, next);
                        },
                        HookAction::Stop {
                            replacement,
                            reason,
                        } => {
                            if let Some(next) = replacement {
                                current = accept_replacement(entry, current, next);
                            }
                            info!(task_id = %current.id(), plugin = entry.name(), %stage, reason = %reason, "hook stopped pipeline");
                            #[cfg(feature = "metrics")]
                            counter!(plugin_metrics::HOOK_STOPS_TOTAL, labels::PLUGIN => entry.name().to_string())
                                .increment(1);
                            halted = Some(Halt {
                                plugin: entry.name().to_string(),
                                reason,
                            });
                            break;
                        },
                    }
                },
                Capability::Trigger { action, exclusive } => {
                    if let Some(group) = exclusive.as_deref()
                        && !filled.insert(group)
                    {
                        debug!(task_id = %current.id(), plugin = entry.name(), group, "exclusive slot already filled");
                        continue;
                    }
                    steps.push(PlannedStep {
                        plugin: entry.name().to_string(),
                        priority: entry.descriptor.priority,
                        action: Arc::clone(action),
                        stats: Arc::clone(&entry.stats),
                    });
                },
            }
        }

        ExecutionPlan {
            task: current,
            steps,
            halted,
        }
    }
}

/// A hook may rewrite a task but not give it a new identity.
fn accept_replacement(entry: &RegisteredPlugin, current: Task, next: Task) -> Task {
    if next.id() == current.id() {
        debug!(task_id = %current.id(), plugin = entry.name(), "hook replaced task");
        next
    } else {
        warn!(
            task_id = %current.id(),
            plugin = entry.name(),
            replacement_id = %next.id(),
            "hook replacement changes task id, ignored"
        );
        current
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            action::{ActionContext, PluginOutput},
            descriptor::PluginDescriptor,
            error::PluginError,
            hook::TaskHook,
        },
        async_trait::async_trait,
        switchyard_protocol::{Location, Platform},
    };

    struct Marker(&'static str);

    #[async_trait]
    impl TaskHook for Marker {
        async fn on_task(&self, _stage: Stage, task: &Task) -> anyhow::Result<HookAction> {
            let marker = self.0;
            Ok(HookAction::Replace(
                task.revise().map_text(|t| format!("{t}{marker}")).build()?,
            ))
        }
    }

    struct Stopper;

    #[async_trait]
    impl TaskHook for Stopper {
        async fn on_task(&self, _stage: Stage, _task: &Task) -> anyhow::Result<HookAction> {
            Ok(HookAction::stop("blocked"))
        }
    }

    struct Failing;

    #[async_trait]
    impl TaskHook for Failing {
        async fn on_task(&self, _stage: Stage, _task: &Task) -> anyhow::Result<HookAction> {
            anyhow::bail!("boom")
        }
    }

    struct Panicking;

    #[async_trait]
    impl TaskHook for Panicking {
        async fn on_task(&self, _stage: Stage, _task: &Task) -> anyhow::Result<HookAction> {
            panic!("hook bug")
        }
    }

    struct Impostor;

    #[async_trait]
    impl TaskHook for Impostor {
        async fn on_task(&self, _stage: Stage, task: &Task) -> anyhow::Result<HookAction> {
            Ok(HookAction::Replace(task.revise().id("other").text("!").build()?))
        }
    }

    struct Noop;

    #[async_trait]
    impl PluginAction for Noop {
        async fn run(&self, _cx: &ActionContext<'_>) -> Result<PluginOutput, PluginError> {
            Ok(PluginOutput::default())
        }
    }

    fn task() -> Task {
        Task::builder(Location::new(Platform::Discord, "C1", "U1"))
            .id("T1")
            .text("msg")
            .build()
            .unwrap()
    }

    fn dispatcher(descriptors: Vec<PluginDescriptor>) -> Dispatcher {
        let mut registry = PluginRegistry::default();
        for d in descriptors {
            registry.register(d).unwrap();
        }
        Dispatcher::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn hooks_apply_in_priority_order() {
        // Registered out of order on purpose.
        let d = dispatcher(vec![
            PluginDescriptor::hook("three", Marker("[3]")).with_priority(3),
            PluginDescriptor::hook("one", Marker("[1]")).with_priority(1),
            PluginDescriptor::hook("two", Marker("[2]")).with_priority(2),
        ]);
        let plan = d.plan(task()).await;
        assert_eq!(plan.task.text(), "msg[1][2][3]");
        assert!(plan.halted.is_none());
    }

    #[tokio::test]
    async fn stop_skips_lower_priority_but_keeps_planned_triggers() {
        let d = dispatcher(vec![
            PluginDescriptor::trigger("early", Noop).with_priority(1),
            PluginDescriptor::hook("gate", Stopper).with_priority(2),
            PluginDescriptor::hook("late_hook", Marker("[x]")).with_priority(3),
            PluginDescriptor::trigger("late", Noop).with_priority(4),
        ]);
        let plan = d.plan(task()).await;
        assert_eq!(plan.plugin_names(), vec!["early"]);
        assert_eq!(plan.task.text(), "msg");
        assert_eq!(plan.halted.unwrap().plugin, "gate");
    }

    #[tokio::test]
    async fn exclusive_group_takes_first_match_only() {
        let d = dispatcher(vec![
            PluginDescriptor::trigger("completion", Noop)
                .with_priority(100)
                .exclusive("responder"),
            PluginDescriptor::trigger("research", Noop)
                .with_priority(10)
                .exclusive("responder"),
            PluginDescriptor::trigger("logger", Noop).with_priority(50),
        ]);
        let plan = d.plan(task()).await;
        assert_eq!(plan.plugin_names(), vec!["research", "logger"]);
    }

    #[tokio::test]
    async fn failing_and_panicking_hooks_do_not_stop_pipeline() {
        let d = dispatcher(vec![
            PluginDescriptor::hook("fails", Failing).with_priority(1),
            PluginDescriptor::hook("panics", Panicking).with_priority(2),
            PluginDescriptor::hook("marks", Marker("[ok]")).with_priority(3),
        ]);
        let plan = d.plan(task()).await;
        assert_eq!(plan.task.text(), "msg[ok]");
        let registry = d.registry();
        assert_eq!(registry.get("fails").unwrap().stats.snapshot().failures, 1);
        assert_eq!(registry.get("panics").unwrap().stats.snapshot().failures, 1);
    }

    #[tokio::test]
    async fn replacement_with_new_identity_is_ignored() {
        let d = dispatcher(vec![PluginDescriptor::hook("impostor", Impostor)]);
        let plan = d.plan(task()).await;
        assert_eq!(plan.task.id().as_str(), "T1");
        assert_eq!(plan.task.text(), "msg");
    }

    #[tokio::test]
    async fn outbound_stage_ignores_triggers_and_inbound_hooks() {
        let d = dispatcher(vec![
            PluginDescriptor::hook("inbound_only", Marker("[in]")),
            PluginDescriptor::trigger("act", Noop),
        ]);
        let outcome = d.run_hooks(task(), Stage::Outbound).await;
        assert_eq!(outcome.task.text(), "msg");
        assert!(outcome.halted.is_none());
    }

    #[tokio::test]
    async fn plan_is_deterministic() {
        let d = dispatcher(vec![
            PluginDescriptor::trigger("a", Noop).with_priority(5),
            PluginDescriptor::trigger("b", Noop).with_priority(5),
            PluginDescriptor::hook("h", Marker("+")).with_priority(5),
        ]);
        let input = task();
        let first = d.plan(input.clone()).await;
        let second = d.plan(input).await;
        assert_eq!(first.plugin_names(), second.plugin_names());
        assert_eq!(first.task, second.task);
    }
}
