/// Config schema types (queue, dedupe, workers, plugins, channels, schedules).
use std::{collections::BTreeMap, time::Duration};

use {
    serde::{Deserialize, Serialize},
    switchyard_protocol::{
        DEDUPE_MAX_ENTRIES, DEDUPE_TTL_MS, DEFAULT_MAX_CHAIN_DEPTH, DEFAULT_MAX_REDELIVERIES,
        DEAD_LETTER_SUFFIX, Location, Platform, RECEIVER_INBOUND, SENDER_OUTBOUND,
    },
};

use crate::error::{Context, Error, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchyardConfig {
    pub queue: QueueConfig,
    pub dedupe: DedupeConfig,
    pub worker: WorkerConfig,
    pub plugins: PluginsConfig,
    /// Explicit values for recognized environment keys. Take precedence
    /// over the process environment.
    pub env: BTreeMap<String, String>,
    /// Per-chat behavior, keyed by chat id.
    pub channels: BTreeMap<String, ChannelBehavior>,
    pub chunking: ChunkingConfig,
    pub schedules: Vec<ScheduleConfig>,
}

impl SwitchyardConfig {
    /// Reject values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.queue.max_redeliveries == 0 {
            return Err(Error::invalid(
                "queue.max_redeliveries",
                "must be at least 1",
            ));
        }
        if self.queue.inbound_queue == self.queue.outbound_queue {
            return Err(Error::invalid(
                "queue.outbound_queue",
                "must differ from queue.inbound_queue",
            ));
        }
        if self.queue.dead_letter_suffix.is_empty() {
            return Err(Error::invalid(
                "queue.dead_letter_suffix",
                "must not be empty",
            ));
        }
        let names = [&self.queue.inbound_queue, &self.queue.outbound_queue];
        for queue in names {
            let dead_letter = self.queue.dead_letter_queue(queue);
            if names.iter().any(|name| **name == dead_letter) {
                return Err(Error::invalid(
                    "queue.dead_letter_suffix",
                    format!("dead-letter queue {dead_letter} collides with a work queue"),
                ));
            }
        }
        if self.dedupe.capacity == 0 {
            return Err(Error::invalid("dedupe.capacity", "must be at least 1"));
        }
        if self.worker.concurrency == 0 {
            return Err(Error::invalid("worker.concurrency", "must be at least 1"));
        }
        if self.worker.task_deadline_secs == 0 {
            return Err(Error::invalid(
                "worker.task_deadline_secs",
                "must be at least 1",
            ));
        }
        for (platform, limit) in self.chunking.limits() {
            if limit < 100 {
                return Err(Error::invalid(
                    format!("chunking.{platform}"),
                    "must be at least 100 characters",
                ));
            }
        }
        for schedule in &self.schedules {
            if schedule.every_secs == 0 {
                return Err(Error::invalid(
                    format!("schedules.{}.every_secs", schedule.name),
                    "must be at least 1",
                ));
            }
            schedule
                .location()
                .validate()
                .with_context(|| format!("invalid location for schedule {}", schedule.name))?;
        }
        Ok(())
    }
}

// ── Queue ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub inbound_queue: String,
    pub outbound_queue: String,
    pub dead_letter_suffix: String,
    /// Redeliveries allowed before a task is routed to dead-letter.
    pub max_redeliveries: u32,
    /// Publish attempts while the broker is unreachable.
    pub publish_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            inbound_queue: RECEIVER_INBOUND.into(),
            outbound_queue: SENDER_OUTBOUND.into(),
            dead_letter_suffix: DEAD_LETTER_SUFFIX.into(),
            max_redeliveries: DEFAULT_MAX_REDELIVERIES,
            publish_retries: 5,
            backoff_base_ms: 200,
            backoff_max_ms: 10_000,
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub fn dead_letter_queue(&self, queue: &str) -> String {
        format!("{queue}{}", self.dead_letter_suffix)
    }
}

// ── Dedupe ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupeConfig {
    /// Maximum remembered task ids; the oldest is evicted first.
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            capacity: DEDUPE_MAX_ENTRIES,
            ttl_secs: DEDUPE_TTL_MS / 1_000,
        }
    }
}

impl DedupeConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

// ── Workers ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrent consumers per role.
    pub concurrency: usize,
    /// A task still processing after this long is abandoned.
    pub task_deadline_secs: u64,
    /// Receiver round-trips allowed before re-routing is refused.
    pub max_chain_depth: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            task_deadline_secs: 120,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            reconnect_delay_ms: 1_000,
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub fn task_deadline(&self) -> Duration {
        Duration::from_secs(self.task_deadline_secs)
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

// ── Plugins ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Plugin names that are never registered.
    pub disabled: Vec<String>,
    /// Extra environment keys captured into the snapshot at startup.
    pub env_keys: Vec<String>,
    pub completion: CompletionConfig,
}

impl PluginsConfig {
    #[must_use]
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|d| d == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Keys that must be present for the completion plugin to load.
    pub required_env: Vec<String>,
    pub default_model: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            required_env: vec!["LLM_API_KEY".into()],
            default_model: "gpt-4o-mini".into(),
        }
    }
}

// ── Channels ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    News,
    Tech,
    #[default]
    General,
    Support,
    Announcement,
    DeepResearch,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStyle {
    #[default]
    Normal,
    Technical,
    Casual,
    Formal,
}

impl ResponseStyle {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Technical => "technical",
            Self::Casual => "casual",
            Self::Formal => "formal",
        }
    }
}

/// How the bot behaves in one chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelBehavior {
    pub active: bool,
    pub kind: ChannelKind,
    pub name: Option<String>,
    pub style: ResponseStyle,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub keywords: Vec<String>,
    pub blocked_keywords: Vec<String>,
    pub require_mention: bool,
    pub auto_respond: bool,
    pub functions_enabled: bool,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Rewrites inbound text; `{text}` is replaced by the original message.
    pub wrap_template: Option<String>,
}

impl Default for ChannelBehavior {
    fn default() -> Self {
        Self {
            active: true,
            kind: ChannelKind::General,
            name: None,
            style: ResponseStyle::Normal,
            prefix: None,
            suffix: None,
            keywords: Vec::new(),
            blocked_keywords: Vec::new(),
            require_mention: false,
            auto_respond: false,
            functions_enabled: true,
            model: None,
            system_prompt: None,
            temperature: 0.7,
            max_tokens: 500,
            wrap_template: None,
        }
    }
}

// ── Chunking ────────────────────────────────────────────────────────────────

/// Maximum characters per outbound message part, per platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub discord: usize,
    pub telegram: usize,
    pub slack: usize,
    pub kook: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            discord: 1_900,
            telegram: 4_000,
            slack: 3_900,
            kook: 7_900,
        }
    }
}

impl ChunkingConfig {
    #[must_use]
    pub fn limit_for(&self, platform: Platform) -> usize {
        match platform {
            Platform::Discord => self.discord,
            Platform::Telegram => self.telegram,
            Platform::Slack => self.slack,
            Platform::Kook => self.kook,
        }
    }

    pub fn limits(&self) -> impl Iterator<Item = (Platform, usize)> + '_ {
        Platform::ALL.iter().map(|p| (*p, self.limit_for(*p)))
    }
}

// ── Schedules ───────────────────────────────────────────────────────────────

/// A task published on a fixed interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub name: String,
    pub every_secs: u64,
    #[serde(default = "default_schedule_queue")]
    pub queue: String,
    pub platform: Platform,
    pub chat_id: String,
    pub user_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub text: String,
}

fn default_schedule_queue() -> String {
    RECEIVER_INBOUND.into()
}

impl ScheduleConfig {
    #[must_use]
    pub fn location(&self) -> Location {
        let location = Location::new(self.platform, &self.chat_id, &self.user_id);
        match &self.thread_id {
            Some(thread) => location.in_thread(thread),
            None => location,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.every_secs)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn defaults_are_finite_and_valid() {
        let cfg = SwitchyardConfig::default();
        assert_eq!(cfg.queue.max_redeliveries, 5);
        assert_eq!(cfg.dedupe.capacity, 1_000);
        assert_eq!(cfg.dedupe.ttl(), Duration::from_secs(300));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_redeliveries_rejected() {
        let mut cfg = SwitchyardConfig::default();
        cfg.queue.max_redeliveries = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("queue.max_redeliveries"));
    }

    #[test]
    fn same_inbound_and_outbound_rejected() {
        let mut cfg = SwitchyardConfig::default();
        cfg.queue.outbound_queue = cfg.queue.inbound_queue.clone();
        assert!(cfg.validate().is_err());
    }

    #[rstest]
    #[case::empty("receiver.inbound", "sender.outbound", "")]
    #[case::inbound_onto_outbound("work", "work.dead", ".dead")]
    #[case::outbound_onto_inbound("work.dead", "work", ".dead")]
    fn dead_letter_suffix_must_name_a_separate_queue(
        #[case] inbound: &str,
        #[case] outbound: &str,
        #[case] suffix: &str,
    ) {
        let mut cfg = SwitchyardConfig::default();
        cfg.queue.inbound_queue = inbound.into();
        cfg.queue.outbound_queue = outbound.into();
        cfg.queue.dead_letter_suffix = suffix.into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("queue.dead_letter_suffix"));
    }

    #[test]
    fn channel_behavior_deserializes_partial() {
        let toml_str = r#"
[channels."1435035369975447662"]
kind = "news"
style = "formal"
prefix = "[NEWSLETTER]"
auto_respond = true
wrap_template = "Summarize:\n{text}"
"#;
        let cfg: SwitchyardConfig = toml::from_str(toml_str).unwrap();
        let news = &cfg.channels["1435035369975447662"];
        assert_eq!(news.kind, ChannelKind::News);
        assert_eq!(news.style, ResponseStyle::Formal);
        assert!(news.active);
        assert_eq!(news.max_tokens, 500);
    }

    #[test]
    fn schedule_with_bad_thread_rejected() {
        let toml_str = r#"
[[schedules]]
name = "rss"
every_secs = 1800
platform = "discord"
chat_id = "C1"
user_id = "U1"
thread_id = "not-a-snowflake"
text = "check feeds"
"#;
        let cfg: SwitchyardConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.schedules[0].queue, RECEIVER_INBOUND);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().starts_with("invalid location for schedule rss: "), "{err}");
    }

    #[test]
    fn chunk_limits_per_platform() {
        let chunking = ChunkingConfig::default();
        assert_eq!(chunking.limit_for(Platform::Discord), 1_900);
        assert_eq!(chunking.limits().count(), Platform::ALL.len());
    }
}
