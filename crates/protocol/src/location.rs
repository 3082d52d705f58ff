use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

// ── Platform ────────────────────────────────────────────────────────────────

/// Chat platforms a task can originate from or be delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Platform {
    Discord,
    Telegram,
    Slack,
    Kook,
}

impl Platform {
    pub const ALL: &'static [Platform] = &[
        Self::Discord,
        Self::Telegram,
        Self::Slack,
        Self::Kook,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::Telegram => "telegram",
            Self::Slack => "slack",
            Self::Kook => "kook",
        }
    }

    /// Whether thread handles on this platform are integers.
    #[must_use]
    pub fn has_numeric_threads(&self) -> bool {
        matches!(self, Self::Discord | Self::Telegram)
    }

    /// Check that `thread_id` is a well-formed thread identifier here.
    #[must_use]
    pub fn is_valid_thread_id(&self, thread_id: &str) -> bool {
        match self {
            // Snowflakes are unsigned 64-bit; zero is never issued.
            Self::Discord => {
                !thread_id.is_empty()
                    && thread_id.len() <= 20
                    && thread_id.bytes().all(|b| b.is_ascii_digit())
                    && thread_id.parse::<u64>().is_ok_and(|id| id > 0)
            },
            Self::Telegram => thread_id.parse::<i64>().is_ok_and(|id| id > 0),
            // Slack threads are keyed by the parent message `ts`, e.g. "1700000000.123456".
            Self::Slack => match thread_id.split_once('.') {
                Some((secs, micros)) => {
                    !secs.is_empty()
                        && !micros.is_empty()
                        && secs.bytes().all(|b| b.is_ascii_digit())
                        && micros.bytes().all(|b| b.is_ascii_digit())
                },
                None => false,
            },
            Self::Kook => !thread_id.is_empty() && !thread_id.chars().any(char::is_whitespace),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| SchemaError::unknown_platform(s))
    }
}

impl TryFrom<String> for Platform {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.as_str().to_string()
    }
}

// ── Location ────────────────────────────────────────────────────────────────

/// Where a task came from or should be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub platform: Platform,
    pub chat_id: String,
    pub user_id: String,
    /// Absent for non-threaded destinations; omitted from the envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Resolved delivery destination for a platform adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryTarget<'a> {
    /// Post directly to the chat/channel.
    Channel { chat_id: &'a str },
    /// Post inside a thread of the chat.
    Thread {
        chat_id: &'a str,
        thread_id: &'a str,
    },
}

impl Location {
    pub fn new(platform: Platform, chat_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            platform,
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            thread_id: None,
        }
    }

    #[must_use]
    pub fn in_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Same chat and user, no thread.
    #[must_use]
    pub fn without_thread(&self) -> Self {
        Self {
            thread_id: None,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chat_id.is_empty() {
            return Err(SchemaError::EmptyField { field: "chat_id" });
        }
        if self.user_id.is_empty() {
            return Err(SchemaError::EmptyField { field: "user_id" });
        }
        if let Some(thread_id) = &self.thread_id
            && !self.platform.is_valid_thread_id(thread_id)
        {
            return Err(SchemaError::invalid_thread_id(self.platform, thread_id));
        }
        Ok(())
    }

    #[must_use]
    pub fn delivery_target(&self) -> DeliveryTarget<'_> {
        match &self.thread_id {
            Some(thread_id) => DeliveryTarget::Thread {
                chat_id: &self.chat_id,
                thread_id,
            },
            None => DeliveryTarget::Channel {
                chat_id: &self.chat_id,
            },
        }
    }

    /// Numeric thread handle for platforms whose APIs take one.
    ///
    /// Returns `Ok(None)` when the location has no thread; the absent case is
    /// never turned into a number.
    pub fn numeric_thread_id(&self) -> Result<Option<u64>> {
        let Some(thread_id) = &self.thread_id else {
            return Ok(None);
        };
        if !self.platform.has_numeric_threads() {
            return Err(SchemaError::invalid_thread_id(self.platform, thread_id));
        }
        thread_id
            .parse::<u64>()
            .ok()
            .filter(|id| *id > 0)
            .map(Some)
            .ok_or_else(|| SchemaError::invalid_thread_id(self.platform, thread_id))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.thread_id {
            Some(thread) => write!(f, "{}:{}#{}", self.platform, self.chat_id, thread),
            None => write!(f, "{}:{}", self.platform, self.chat_id),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(Platform::Discord, "1234567890123456789", true)]
    #[case(Platform::Discord, "0", false)]
    #[case(Platform::Discord, "12a4", false)]
    #[case(Platform::Discord, "", false)]
    #[case(Platform::Discord, "123456789012345678901", false)]
    #[case(Platform::Telegram, "42", true)]
    #[case(Platform::Telegram, "-42", false)]
    #[case(Platform::Slack, "1700000000.123456", true)]
    #[case(Platform::Slack, "1700000000", false)]
    #[case(Platform::Slack, ".123", false)]
    #[case(Platform::Kook, "quote-abc", true)]
    #[case(Platform::Kook, "has space", false)]
    fn thread_id_validity(#[case] platform: Platform, #[case] thread: &str, #[case] ok: bool) {
        assert_eq!(platform.is_valid_thread_id(thread), ok);
    }

    #[test]
    fn platform_parses_known_tags_only() {
        assert_eq!("discord".parse::<Platform>().unwrap(), Platform::Discord);
        assert!(matches!(
            "discord_hikari".parse::<Platform>(),
            Err(SchemaError::UnknownPlatform { .. })
        ));
    }

    #[test]
    fn absent_thread_targets_channel() {
        let loc = Location::new(Platform::Discord, "C1", "U1");
        assert_eq!(loc.delivery_target(), DeliveryTarget::Channel {
            chat_id: "C1"
        });
        assert_eq!(loc.numeric_thread_id().unwrap(), None);
    }

    #[test]
    fn present_thread_targets_thread() {
        let loc = Location::new(Platform::Discord, "C1", "U1").in_thread("998877");
        assert_eq!(loc.delivery_target(), DeliveryTarget::Thread {
            chat_id: "C1",
            thread_id: "998877"
        });
        assert_eq!(loc.numeric_thread_id().unwrap(), Some(998_877));
    }

    #[test]
    fn slack_thread_is_not_numeric() {
        let loc = Location::new(Platform::Slack, "C1", "U1").in_thread("1700000000.000100");
        assert!(loc.validate().is_ok());
        assert!(loc.numeric_thread_id().is_err());
    }

    #[test]
    fn empty_chat_is_rejected() {
        let loc = Location::new(Platform::Telegram, "", "U1");
        assert_eq!(loc.validate(), Err(SchemaError::EmptyField {
            field: "chat_id"
        }));
    }

    #[test]
    fn serializes_without_thread_field_when_absent() {
        let loc = Location::new(Platform::Kook, "C1", "U1");
        let json = serde_json::to_value(&loc).unwrap();
        assert!(json.get("thread_id").is_none());
        assert_eq!(json["platform"], "kook");
    }
}
