//! Per-chat behavior from the `[channels]` config table.
//!
//! The gate (inbound) decides whether the bot answers at all and writes the
//! chat's model settings into the task context. The decoration (outbound)
//! adds the chat's prefix and suffix to replies.

use std::{collections::BTreeMap, sync::Arc};

use {
    async_trait::async_trait,
    serde_json::Value,
    switchyard_config::{ChannelBehavior, ChannelKind},
    switchyard_protocol::{Task, TaskContext},
    tracing::debug,
};

use crate::{
    descriptor::{PluginDescriptor, Stage},
    hook::{HookAction, TaskHook},
};

pub const GATE_NAME: &str = "channel_behavior";
pub const DECORATION_NAME: &str = "channel_decoration";

type Channels = Arc<BTreeMap<String, ChannelBehavior>>;

pub fn gate_descriptor(channels: Channels) -> PluginDescriptor {
    PluginDescriptor::hook(GATE_NAME, ChannelGate { channels })
        .with_priority(5)
        .with_description("Per-chat response rules and model settings")
}

pub fn decoration_descriptor(channels: Channels) -> PluginDescriptor {
    PluginDescriptor::hook(DECORATION_NAME, ChannelDecoration { channels })
        .with_priority(20)
        .with_description("Per-chat reply prefix and suffix")
}

pub struct ChannelGate {
    channels: Channels,
}

const NEWS_TERMS: &[&str] = &["?", "news", "update", "summary", "what", "how", "why"];
const TECH_TERMS: &[&str] = &["?", "error", "bug", "help", "code", "debug", "how to"];
const RESEARCH_TERMS: &[&str] = &["research", "analyze", "study", "investigate", "explore", "?"];
const ANYTHING: &[&str] = &[];

/// Words that make a chat of this kind answer without keywords or mention.
/// An empty list answers everything.
fn kind_terms(kind: ChannelKind) -> Option<&'static [&'static str]> {
    match kind {
        ChannelKind::News => Some(NEWS_TERMS),
        ChannelKind::Tech => Some(TECH_TERMS),
        ChannelKind::DeepResearch => Some(RESEARCH_TERMS),
        ChannelKind::Support => Some(ANYTHING),
        ChannelKind::General | ChannelKind::Announcement | ChannelKind::Custom => None,
    }
}

fn contains_any<S: AsRef<str>>(haystack: &str, needles: &[S]) -> Option<String> {
    needles
        .iter()
        .map(|n| n.as_ref().to_lowercase())
        .find(|n| haystack.contains(n.as_str()))
}

fn is_mentioned(task: &Task) -> bool {
    match task.context().metadata.get("mentioned") {
        Some(Value::Bool(mentioned)) => *mentioned,
        _ => task.text().contains('@'),
    }
}

impl ChannelGate {
    /// `Err(reason)` when the bot stays silent.
    fn admit(behavior: &ChannelBehavior, task: &Task) -> Result<(), String> {
        if !behavior.active {
            return Err("channel inactive".into());
        }
        let text = task.text().to_lowercase();
        if let Some(word) = contains_any(&text, &behavior.blocked_keywords) {
            return Err(format!("blocked keyword {word:?}"));
        }
        if behavior.require_mention && !is_mentioned(task) {
            return Err("mention required".into());
        }
        if contains_any(&text, &behavior.keywords).is_some() || behavior.auto_respond {
            return Ok(());
        }
        match kind_terms(behavior.kind) {
            Some([]) => Ok(()),
            Some(terms) if contains_any(&text, terms).is_some() => Ok(()),
            _ if behavior.require_mention => Ok(()),
            _ => Err("no trigger condition".into()),
        }
    }

    fn apply(behavior: &ChannelBehavior, context: &mut TaskContext) {
        let meta = &mut context.metadata;
        meta.insert("channel_kind".into(), serde_json::to_value(behavior.kind).unwrap_or_default());
        meta.insert("style".into(), Value::from(behavior.style.as_str()));
        meta.insert("temperature".into(), Value::from(f64::from(behavior.temperature)));
        meta.insert("max_tokens".into(), Value::from(behavior.max_tokens));
        if let Some(model) = &behavior.model {
            meta.insert("model".into(), Value::from(model.as_str()));
        }
        if let Some(prompt) = &behavior.system_prompt {
            meta.insert("system_prompt".into(), Value::from(prompt.as_str()));
        }
        if !behavior.functions_enabled {
            context.disable_tools = true;
        }
    }
}

#[async_trait]
impl TaskHook for ChannelGate {
    async fn on_task(&self, _stage: Stage, task: &Task) -> anyhow::Result<HookAction> {
        let Some(behavior) = self.channels.get(&task.location().chat_id) else {
            return Ok(HookAction::Continue);
        };
        if let Err(reason) = Self::admit(behavior, task) {
            debug!(task_id = %task.id(), chat_id = %task.location().chat_id, reason = %reason, "channel gate closed");
            return Ok(HookAction::stop(reason));
        }

        let mut revised = task.revise().map_context(|c| Self::apply(behavior, c));
        if let Some(template) = &behavior.wrap_template {
            revised = revised.map_text(|t| template.replace("{text}", t));
        }
        Ok(HookAction::Replace(revised.build()?))
    }
}

pub struct ChannelDecoration {
    channels: Channels,
}

#[async_trait]
impl TaskHook for ChannelDecoration {
    fn stages(&self) -> &[Stage] {
        &[Stage::Outbound]
    }

    async fn on_task(&self, _stage: Stage, task: &Task) -> anyhow::Result<HookAction> {
        let Some(behavior) = self.channels.get(&task.location().chat_id) else {
            return Ok(HookAction::Continue);
        };
        if behavior.prefix.is_none() && behavior.suffix.is_none() {
            return Ok(HookAction::Continue);
        }
        let decorated = task
            .revise()
            .map_text(|t| {
                let mut out = String::new();
                if let Some(prefix) = &behavior.prefix {
                    out.push_str(prefix);
                    out.push(' ');
                }
                out.push_str(t);
                if let Some(suffix) = &behavior.suffix {
                    out.push(' ');
                    out.push_str(suffix);
                }
                out
            })
            .build()?;
        Ok(HookAction::Replace(decorated))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        rstest::rstest,
        switchyard_config::ResponseStyle,
        switchyard_protocol::{Location, MessagePart, Platform},
    };

    fn texts(task: &Task) -> Vec<&str> {
        task.payload().iter().filter_map(MessagePart::as_text).collect()
    }

    fn task_in(chat: &str, text: &str) -> Task {
        Task::builder(Location::new(Platform::Discord, chat, "U1"))
            .id("T1")
            .text(text)
            .build()
            .unwrap()
    }

    fn gate(behavior: ChannelBehavior) -> ChannelGate {
        ChannelGate {
            channels: Arc::new(BTreeMap::from([("C1".to_string(), behavior)])),
        }
    }

    #[tokio::test]
    async fn unknown_chat_passes_through() {
        let hook = gate(ChannelBehavior::default());
        let action = hook.on_task(Stage::Inbound, &task_in("other", "hi")).await.unwrap();
        assert!(matches!(action, HookAction::Continue));
    }

    #[rstest]
    #[case(ChannelBehavior { active: false, auto_respond: true, ..Default::default() }, "hello")]
    #[case(ChannelBehavior { blocked_keywords: vec!["SPAM".into()], auto_respond: true, ..Default::default() }, "buy spam now")]
    #[case(ChannelBehavior { require_mention: true, ..Default::default() }, "no mention here")]
    #[case(ChannelBehavior { keywords: vec!["deploy".into()], ..Default::default() }, "unrelated chatter")]
    #[tokio::test]
    async fn gate_stops(#[case] behavior: ChannelBehavior, #[case] text: &str) {
        let action = gate(behavior).on_task(Stage::Inbound, &task_in("C1", text)).await.unwrap();
        assert!(matches!(action, HookAction::Stop { replacement: None, .. }));
    }

    #[rstest]
    #[case(ChannelBehavior { keywords: vec!["Deploy".into()], ..Default::default() }, "please deploy")]
    #[case(ChannelBehavior { auto_respond: true, ..Default::default() }, "anything")]
    #[case(ChannelBehavior { require_mention: true, ..Default::default() }, "@bot hi")]
    #[case(ChannelBehavior { kind: ChannelKind::Tech, ..Default::default() }, "got an error")]
    #[case(ChannelBehavior { kind: ChannelKind::Support, ..Default::default() }, "hello")]
    #[tokio::test]
    async fn gate_admits(#[case] behavior: ChannelBehavior, #[case] text: &str) {
        let action = gate(behavior).on_task(Stage::Inbound, &task_in("C1", text)).await.unwrap();
        assert!(matches!(action, HookAction::Replace(_)));
    }

    #[tokio::test]
    async fn gate_writes_settings_and_wraps_text() {
        let hook = gate(ChannelBehavior {
            auto_respond: true,
            style: ResponseStyle::Formal,
            model: Some("gpt-4o".into()),
            functions_enabled: false,
            wrap_template: Some("Summarize:\n{text}".into()),
            ..Default::default()
        });
        let HookAction::Replace(task) = hook.on_task(Stage::Inbound, &task_in("C1", "news body")).await.unwrap() else {
            panic!("expected replacement");
        };
        assert_eq!(task.id().as_str(), "T1");
        assert_eq!(task.text(), "Summarize:\nnews body");
        assert_eq!(task.context().meta_str("model"), Some("gpt-4o"));
        assert_eq!(task.context().meta_str("style"), Some("formal"));
        assert!(task.context().disable_tools);
    }

    #[tokio::test]
    async fn decoration_adds_prefix_and_suffix() {
        let hook = ChannelDecoration {
            channels: Arc::new(BTreeMap::from([(
                "C1".to_string(),
                ChannelBehavior {
                    prefix: Some("[NEWS]".into()),
                    suffix: Some("-- bot".into()),
                    ..Default::default()
                },
            )])),
        };
        let HookAction::Replace(task) = hook.on_task(Stage::Outbound, &task_in("C1", "body")).await.unwrap() else {
            panic!("expected replacement");
        };
        assert_eq!(texts(&task), vec!["[NEWS] body -- bot"]);
    }
}
