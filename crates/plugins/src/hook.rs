use {async_trait::async_trait, switchyard_protocol::Task};

use crate::descriptor::Stage;

/// What a hook wants done with the task it saw.
#[derive(Debug, Default)]
pub enum HookAction {
    #[default]
    Continue,
    /// Continue with this task instead. Must keep the same task id.
    Replace(Task),
    /// End the pipeline here. Lower-priority hooks and triggers are not
    /// considered.
    Stop {
        replacement: Option<Task>,
        reason: String,
    },
}

impl HookAction {
    pub fn stop(reason: impl Into<String>) -> Self {
        Self::Stop {
            replacement: None,
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait TaskHook: Send + Sync {
    /// Stages this hook runs in.
    fn stages(&self) -> &[Stage] {
        &[Stage::Inbound]
    }

    /// Errors are logged and treated as [`HookAction::Continue`].
    async fn on_task(&self, stage: Stage, task: &Task) -> anyhow::Result<HookAction>;
}
