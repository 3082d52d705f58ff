//! Completion trigger: the default responder.

use std::sync::Arc;

use {
    async_trait::async_trait,
    serde_json::Value,
    switchyard_config::CompletionConfig,
    switchyard_protocol::Task,
    tracing::warn,
};

use crate::{
    action::{ActionContext, Emit, PluginAction, PluginOutput},
    bundled::RESPONDER_GROUP,
    completion::{ChatMessage, ChatRole, CompletionClient, CompletionError, CompletionRequest},
    descriptor::PluginDescriptor,
    error::PluginError,
};

pub const NAME: &str = "completion";

pub fn descriptor(client: Arc<dyn CompletionClient>, config: &CompletionConfig) -> PluginDescriptor {
    PluginDescriptor::trigger(NAME, CompletionPlugin {
        client,
        default_model: config.default_model.clone(),
    })
    .with_priority(100)
    .exclusive(RESPONDER_GROUP)
    .requires_env(config.required_env.iter().cloned())
    .with_description("Language-model reply")
}

pub struct CompletionPlugin {
    client: Arc<dyn CompletionClient>,
    default_model: String,
}

impl CompletionPlugin {
    fn request(&self, task: &Task) -> Result<CompletionRequest, PluginError> {
        let context = task.context();
        let mut messages = Vec::new();
        if let Some(prompt) = context.meta_str("system_prompt") {
            messages.push(ChatMessage::new(ChatRole::System, prompt));
        }
        let text = task.text();
        if !text.trim().is_empty() {
            messages.push(ChatMessage::new(ChatRole::User, text));
        }
        for response in &context.tool_responses {
            messages.push(ChatMessage::new(ChatRole::Tool, response.content.as_str()));
        }
        if messages.iter().all(|m| m.role == ChatRole::System) {
            return Err(PluginError::declared("I can only answer text messages."));
        }
        Ok(CompletionRequest {
            model: context
                .meta_str("model")
                .unwrap_or(&self.default_model)
                .to_string(),
            messages,
            temperature: context
                .metadata
                .get("temperature")
                .and_then(Value::as_f64)
                .map(|t| t as f32),
            max_tokens: context
                .metadata
                .get("max_tokens")
                .and_then(Value::as_u64)
                .and_then(|t| u32::try_from(t).ok()),
            history_ref: context.history_ref.clone(),
        })
    }
}

#[async_trait]
impl PluginAction for CompletionPlugin {
    async fn run(&self, cx: &ActionContext<'_>) -> Result<PluginOutput, PluginError> {
        let request = self.request(cx.task)?;
        match self.client.complete(request).await {
            Ok(completion) => Ok(PluginOutput::reply(completion.text)),
            Err(CompletionError::RateLimited { retry_after }) => {
                warn!(task_id = %cx.task.id(), ?retry_after, "completion rate limited");
                Err(PluginError::declared(
                    "The assistant is busy right now. Please try again shortly.",
                ))
            },
            Err(CompletionError::InvalidRequest { message }) => {
                warn!(task_id = %cx.task.id(), %message, "completion request rejected");
                Err(PluginError::declared("That request could not be processed."))
            },
            Err(CompletionError::Network(e)) => {
                Err(PluginError::Unexpected(e.context("completion request failed")))
            },
        }
    }

    fn failed(&self, _cx: &ActionContext<'_>, error: &PluginError) -> Vec<Emit> {
        vec![Emit::reply(error.to_string())]
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::completion::{Completion, EchoCompletionClient},
        std::sync::Mutex,
        switchyard_protocol::{Location, Platform, ToolResponse},
    };

    struct Scripted {
        result: Mutex<Option<Result<Completion, CompletionError>>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn new(result: Result<Completion, CompletionError>) -> Self {
            Self {
                result: Mutex::new(Some(result)),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for Scripted {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
            self.seen.lock().unwrap().push(request);
            self.result.lock().unwrap().take().unwrap()
        }
    }

    fn plugin(client: Arc<dyn CompletionClient>) -> CompletionPlugin {
        CompletionPlugin {
            client,
            default_model: "default-model".into(),
        }
    }

    fn task() -> Task {
        Task::builder(Location::new(Platform::Slack, "C1", "U1"))
            .text("hi")
            .map_context(|c| {
                c.metadata.insert("model".into(), Value::from("gpt-4o"));
                c.metadata.insert("system_prompt".into(), Value::from("be kind"));
                c.metadata.insert("temperature".into(), Value::from(0.5));
                c.tool_responses.push(ToolResponse {
                    plugin: "deep_research".into(),
                    call_id: "c1".into(),
                    content: "instruction".into(),
                });
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn request_carries_context_settings() {
        let client = Arc::new(Scripted::new(Ok(Completion {
            text: "hello!".into(),
            model: "gpt-4o".into(),
        })));
        let t = task();
        let cx = ActionContext {
            task: &t,
            plugin: NAME,
        };
        let output = plugin(client.clone()).run(&cx).await.unwrap();
        assert_eq!(output.emits[0].parts[0].as_text(), Some("hello!"));

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].model, "gpt-4o");
        assert_eq!(seen[0].temperature, Some(0.5));
        let roles: Vec<_> = seen[0].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![ChatRole::System, ChatRole::User, ChatRole::Tool]);
    }

    #[tokio::test]
    async fn rate_limit_is_declared() {
        let client = Arc::new(Scripted::new(Err(CompletionError::RateLimited {
            retry_after: None,
        })));
        let t = task();
        let cx = ActionContext {
            task: &t,
            plugin: NAME,
        };
        let p = plugin(client);
        let err = p.run(&cx).await.unwrap_err();
        assert!(err.is_declared());
        let emits = p.failed(&cx, &err);
        assert!(emits[0].parts[0].as_text().unwrap().contains("busy"));
    }

    #[tokio::test]
    async fn network_error_is_unexpected() {
        let client = Arc::new(Scripted::new(Err(CompletionError::Network(anyhow::anyhow!(
            "connection reset"
        )))));
        let t = task();
        let cx = ActionContext {
            task: &t,
            plugin: NAME,
        };
        let err = plugin(client).run(&cx).await.unwrap_err();
        assert!(matches!(err, PluginError::Unexpected(_)));
    }

    #[tokio::test]
    async fn default_model_used_without_metadata() {
        let t = Task::builder(Location::new(Platform::Kook, "C1", "U1"))
            .text("ping")
            .build()
            .unwrap();
        let cx = ActionContext {
            task: &t,
            plugin: NAME,
        };
        let output = plugin(Arc::new(EchoCompletionClient)).run(&cx).await.unwrap();
        assert_eq!(output.emits[0].parts[0].as_text(), Some("ping"));
    }
}
