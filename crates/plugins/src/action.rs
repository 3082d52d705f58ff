use {
    async_trait::async_trait,
    serde_json::Value,
    switchyard_protocol::{Location, MessagePart, Task, ToolResponse},
};

use crate::error::PluginError;

/// Where an emitted result goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Back to the user through the sender queue.
    Sender,
    /// Another receiver pass, e.g. a completion after a tool call.
    Receiver,
    /// Any other named queue.
    Queue(String),
}

/// One result a plugin wants published.
#[derive(Debug, Clone, PartialEq)]
pub struct Emit {
    pub parts: Vec<MessagePart>,
    pub destination: Destination,
    /// Overrides the originating location.
    pub location: Option<Location>,
    pub tool_response: Option<ToolResponse>,
}

impl Emit {
    /// Text for the user at the originating location.
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            parts: vec![MessagePart::text(text)],
            destination: Destination::Sender,
            location: None,
            tool_response: None,
        }
    }

    /// Text for another receiver pass.
    pub fn reroute(text: impl Into<String>) -> Self {
        Self {
            destination: Destination::Receiver,
            ..Self::reply(text)
        }
    }

    #[must_use]
    pub fn with_parts(mut self, parts: Vec<MessagePart>) -> Self {
        self.parts = parts;
        self
    }

    #[must_use]
    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub fn to_queue(mut self, queue: impl Into<String>) -> Self {
        self.destination = Destination::Queue(queue.into());
        self
    }

    #[must_use]
    pub fn with_tool_response(mut self, response: ToolResponse) -> Self {
        self.tool_response = Some(response);
        self
    }
}

/// What a successful action produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginOutput {
    pub emits: Vec<Emit>,
    /// State for a deferred [`PluginAction::callback`]. Runs after the
    /// whole plan, at most once per task.
    pub continuation: Option<Value>,
}

impl PluginOutput {
    pub fn reply(text: impl Into<String>) -> Self {
        Self::emit(Emit::reply(text))
    }

    pub fn emit(emit: Emit) -> Self {
        Self {
            emits: vec![emit],
            continuation: None,
        }
    }

    #[must_use]
    pub fn then(mut self, state: Value) -> Self {
        self.continuation = Some(state);
        self
    }
}

/// What an action sees of the task it runs for.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub task: &'a Task,
    pub plugin: &'a str,
}

#[async_trait]
pub trait PluginAction: Send + Sync {
    async fn run(&self, cx: &ActionContext<'_>) -> Result<PluginOutput, PluginError>;

    /// User-facing message for a declared failure. Only this plugin's
    /// failure is handled here; siblings keep running.
    fn failed(&self, cx: &ActionContext<'_>, error: &PluginError) -> Vec<Emit> {
        vec![Emit::reply(format!("{} could not finish: {error}", cx.plugin))]
    }

    /// Deferred continuation registered by [`PluginOutput::then`].
    async fn callback(
        &self,
        _cx: &ActionContext<'_>,
        _state: Value,
    ) -> Result<PluginOutput, PluginError> {
        Ok(PluginOutput::default())
    }
}
