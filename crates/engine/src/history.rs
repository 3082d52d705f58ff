//! Conversation history notification.
//!
//! History storage lives outside the core. The sink is told about each
//! finalized task without waiting for, or depending on, the result.

use {
    async_trait::async_trait,
    serde::Serialize,
    switchyard_plugins::Emit,
    switchyard_protocol::{Platform, Task, TaskId},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub task_id: TaskId,
    pub history_ref: Option<String>,
    pub platform: Platform,
    pub chat_id: String,
    pub user_id: String,
    pub request: String,
    pub response: String,
    /// Plugins whose tool responses were produced for this task.
    pub tool_calls: Vec<String>,
    pub timestamp_ms: u64,
}

impl HistoryEntry {
    pub fn from_outputs(origin: &Task, emits: &[Emit]) -> Self {
        let response = emits
            .iter()
            .flat_map(|e| e.parts.iter().filter_map(|p| p.as_text()))
            .collect::<Vec<_>>()
            .join("\n");
        let location = origin.location();
        Self {
            task_id: origin.id().clone(),
            history_ref: origin.context().history_ref.clone(),
            platform: location.platform,
            chat_id: location.chat_id.clone(),
            user_id: location.user_id.clone(),
            request: origin.text(),
            response,
            tool_calls: emits
                .iter()
                .filter_map(|e| e.tool_response.as_ref().map(|r| r.plugin.clone()))
                .collect(),
            timestamp_ms: switchyard_common::time::now_ms(),
        }
    }
}

#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, entry: HistoryEntry) -> anyhow::Result<()>;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        switchyard_protocol::{Location, ToolResponse},
    };

    #[test]
    fn entry_collects_response_text_and_tools() {
        let task = Task::builder(Location::new(Platform::Slack, "C9", "U9"))
            .id("T1")
            .text("question")
            .build()
            .unwrap();
        let emits = vec![
            Emit::reply("answer"),
            Emit::reroute("again").with_tool_response(ToolResponse {
                plugin: "deep_research".into(),
                call_id: "c".into(),
                content: "x".into(),
            }),
        ];
        let entry = HistoryEntry::from_outputs(&task, &emits);
        assert_eq!(entry.request, "question");
        assert_eq!(entry.response, "answer\nagain");
        assert_eq!(entry.tool_calls, vec!["deep_research"]);
        assert_eq!(entry.chat_id, "C9");
    }
}
