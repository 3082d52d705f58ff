//! Runs an execution plan.
//!
//! Each planned action is invoked in order and isolated from its siblings:
//! a declared failure is turned into the plugin's own user-facing message,
//! an unexpected failure or panic into a generic one. Only a malformed task
//! changes how the delivery is settled.

use std::{
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use {
    futures::FutureExt,
    serde_json::Value,
    switchyard_plugins::{ActionContext, Emit, ExecutionPlan, PluginAction, PluginError, PluginOutput},
    switchyard_protocol::Task,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use switchyard_metrics::{counter, histogram, labels, plugins as plugin_metrics};

use crate::continuation::{Continuation, Continuations};

/// What the worker should do with the delivery once the engine is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Processing finished; business failures included.
    Ack,
    /// The task cannot be processed; hand it to the retry/dead-letter policy.
    Reject { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Declared { message: String },
    Unexpected,
    Malformed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub plugin: String,
    /// Whether this was a deferred continuation rather than a planned run.
    pub continuation: bool,
    pub outcome: StepOutcome,
}

#[derive(Debug)]
pub struct EngineOutput {
    /// The task as it left the inbound hooks.
    pub task: Task,
    pub emits: Vec<Emit>,
    pub steps: Vec<StepRecord>,
    pub disposition: Disposition,
}

/// Message substituted when a plugin fails outside its contract.
pub fn unavailable_message(plugin: &str) -> String {
    format!("Sorry, {plugin} is unavailable right now.")
}

/// Stateless between runs; continuations live only as long as one `run`.
#[derive(Debug, Default)]
pub struct ExecutionEngine;

impl ExecutionEngine {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self, plan: ExecutionPlan) -> EngineOutput {
        let ExecutionPlan {
            task,
            steps: planned,
            halted,
        } = plan;
        if let Some(halt) = &halted {
            debug!(task_id = %task.id(), plugin = %halt.plugin, reason = %halt.reason, "pipeline halted by hook");
        }

        let mut emits = Vec::new();
        let mut steps = Vec::new();
        let mut continuations = Continuations::new();

        for step in &planned {
            let cx = ActionContext {
                task: &task,
                plugin: &step.plugin,
            };
            let (result, latency) = invoke(step.action.run(&cx)).await;
            let outcome = match result {
                Ok(output) => {
                    step.stats.record_success(latency);
                    record_run(&step.plugin, latency);
                    if let Some(state) = output.continuation.clone() {
                        let registered = continuations.register(Continuation {
                            plugin: step.plugin.clone(),
                            state,
                            action: Arc::clone(&step.action),
                            stats: Arc::clone(&step.stats),
                        });
                        if !registered {
                            warn!(task_id = %task.id(), plugin = %step.plugin, "duplicate continuation ignored");
                        }
                    }
                    emits.extend(output.emits);
                    StepOutcome::Succeeded
                },
                Err(e) => {
                    step.stats.record_failure(latency);
                    record_run(&step.plugin, latency);
                    failure_outcome(&cx, step.action.as_ref(), e, &mut emits)
                },
            };
            let malformed = matches!(outcome, StepOutcome::Malformed { .. });
            steps.push(StepRecord {
                plugin: step.plugin.clone(),
                continuation: false,
                outcome,
            });
            if malformed {
                break;
            }
        }

        if let Some(reason) = malformed_reason(&steps) {
            // Nothing is published for a task that will be redelivered or
            // dead-lettered; collected output and callbacks are dropped.
            return EngineOutput {
                task,
                emits: Vec::new(),
                steps,
                disposition: Disposition::Reject { reason },
            };
        }

        for continuation in continuations {
            let cx = ActionContext {
                task: &task,
                plugin: &continuation.plugin,
            };
            debug!(task_id = %task.id(), plugin = %continuation.plugin, "running continuation");
            let (result, latency) = invoke(continuation.action.callback(&cx, continuation.state)).await;
            let outcome = match result {
                Ok(output) => {
                    continuation.stats.record_success(latency);
                    if output.continuation.is_some() {
                        warn!(task_id = %task.id(), plugin = %continuation.plugin, "continuation may not register another");
                    }
                    emits.extend(output.emits);
                    StepOutcome::Succeeded
                },
                Err(e) => {
                    continuation.stats.record_failure(latency);
                    failure_outcome(&cx, continuation.action.as_ref(), e, &mut emits)
                },
            };
            steps.push(StepRecord {
                plugin: continuation.plugin.clone(),
                continuation: true,
                outcome,
            });
        }

        info!(
            task_id = %task.id(),
            steps = steps.len(),
            emits = emits.len(),
            halted = halted.is_some(),
            "plan executed"
        );

        EngineOutput {
            task,
            emits,
            steps,
            disposition: Disposition::Ack,
        }
    }
}

/// Await an action with panic isolation. A panic is reported as an
/// unexpected failure.
async fn invoke<F>(future: F) -> (Result<PluginOutput, PluginError>, Duration)
where
    F: Future<Output = Result<PluginOutput, PluginError>>,
{
    let start = Instant::now();
    let result = match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(PluginError::Unexpected(anyhow::anyhow!(
            "plugin panicked: {}",
            panic_message(panic.as_ref())
        ))),
    };
    (result, start.elapsed())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn failure_outcome(
    cx: &ActionContext<'_>,
    action: &dyn PluginAction,
    error: PluginError,
    emits: &mut Vec<Emit>,
) -> StepOutcome {
    match error {
        PluginError::Declared { ref message } => {
            warn!(task_id = %cx.task.id(), plugin = cx.plugin, %message, "plugin reported failure");
            #[cfg(feature = "metrics")]
            counter!(plugin_metrics::DECLARED_FAILURES_TOTAL, labels::PLUGIN => cx.plugin.to_string())
                .increment(1);
            emits.extend(action.failed(cx, &error));
            StepOutcome::Declared {
                message: message.clone(),
            }
        },
        PluginError::MalformedTask { reason } => {
            warn!(task_id = %cx.task.id(), plugin = cx.plugin, %reason, "plugin rejected malformed task");
            StepOutcome::Malformed { reason }
        },
        PluginError::Unexpected(e) => {
            let detail = format!("{e:#}");
            error!(task_id = %cx.task.id(), plugin = cx.plugin, error = %detail, "plugin failed unexpectedly");
            #[cfg(feature = "metrics")]
            counter!(plugin_metrics::UNEXPECTED_FAILURES_TOTAL, labels::PLUGIN => cx.plugin.to_string())
                .increment(1);
            emits.push(Emit::reply(unavailable_message(cx.plugin)));
            StepOutcome::Unexpected
        },
    }
}

fn malformed_reason(steps: &[StepRecord]) -> Option<String> {
    steps.iter().find_map(|s| match &s.outcome {
        StepOutcome::Malformed { reason } => Some(format!("{}: {reason}", s.plugin)),
        _ => None,
    })
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
fn record_run(plugin: &str, latency: Duration) {
    #[cfg(feature = "metrics")]
    {
        counter!(plugin_metrics::RUNS_TOTAL, labels::PLUGIN => plugin.to_string()).increment(1);
        histogram!(plugin_metrics::RUN_DURATION_SECONDS, labels::PLUGIN => plugin.to_string())
            .record(latency.as_secs_f64());
    }
}
