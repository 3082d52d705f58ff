use std::collections::BTreeMap;

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// Carry-along state read by the dispatcher and engine. Opaque to the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskContext {
    /// Key of the conversation history this task belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_ref: Option<String>,
    /// Tool call awaiting execution by a plugin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_call: Option<PendingCall>,
    /// Results of earlier tool calls, fed into the next completion.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_responses: Vec<ToolResponse>,
    /// How many receiver round-trips produced this task.
    #[serde(skip_serializing_if = "is_zero")]
    pub chain_depth: u32,
    /// Plugin-level retries, distinct from broker redelivery.
    #[serde(skip_serializing_if = "is_zero")]
    pub retry_count: u32,
    /// Disable tool-calling plugins for this task.
    #[serde(skip_serializing_if = "is_false")]
    pub disable_tools: bool,
    /// Free-form per-task settings (model, system prompt, temperature...).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl TaskContext {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Read a metadata entry as a string.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Whether any tool response was produced by `plugin`.
    #[must_use]
    pub fn has_response_from(&self, plugin: &str) -> bool {
        self.tool_responses.iter().any(|r| r.plugin == plugin)
    }
}

/// A tool call a plugin is expected to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCall {
    pub call_id: String,
    pub plugin: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Output of a completed tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub plugin: String,
    pub call_id: String,
    pub content: String,
}
