use crate::location::Platform;

/// Crate-wide result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;

/// A task envelope that cannot be accepted. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("task payload is empty")]
    EmptyPayload,

    #[error("task id is empty")]
    EmptyTaskId,

    #[error("unknown platform tag: {tag}")]
    UnknownPlatform { tag: String },

    #[error("location {field} is empty")]
    EmptyField { field: &'static str },

    #[error("invalid thread id {thread_id:?} for platform {platform}")]
    InvalidThreadId {
        platform: Platform,
        thread_id: String,
    },

    #[error("malformed task envelope: {message}")]
    Malformed { message: String },
}

impl SchemaError {
    #[must_use]
    pub fn unknown_platform(tag: impl Into<String>) -> Self {
        Self::UnknownPlatform { tag: tag.into() }
    }

    #[must_use]
    pub fn invalid_thread_id(platform: Platform, thread_id: impl Into<String>) -> Self {
        Self::InvalidThreadId {
            platform,
            thread_id: thread_id.into(),
        }
    }

    #[must_use]
    pub fn malformed(message: impl std::fmt::Display) -> Self {
        Self::Malformed {
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(source: serde_json::Error) -> Self {
        Self::malformed(source)
    }
}
