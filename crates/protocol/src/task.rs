use std::fmt;

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::{
    context::TaskContext,
    error::{Result, SchemaError},
    location::Location,
};

// ── TaskId ──────────────────────────────────────────────────────────────────

/// Opaque task identifier, assigned once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// A fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Identifier of the `index`-th follow-up of this task.
    ///
    /// Derivation is deterministic so a redelivered task yields the same
    /// follow-up ids as its first delivery.
    #[must_use]
    pub fn derive(&self, index: usize) -> Self {
        Self(format!("{}/{index}", self.0))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Message parts ───────────────────────────────────────────────────────────

/// Reference to a file stored outside the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// One element of a task payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePart {
    Text { text: String },
    File { file: FileRef },
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::File { .. } => None,
        }
    }
}

// ── Task ────────────────────────────────────────────────────────────────────

/// Unit of work flowing through the queue.
///
/// Fields are read-only; a changed task is built through [`Task::revise`]
/// (same identity, before publication) or [`Task::follow_up`] (new
/// identity, for results).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    task_id: TaskId,
    location: Location,
    payload: Vec<MessagePart>,
    #[serde(default, skip_serializing_if = "TaskContext::is_empty")]
    context: TaskContext,
    created_at: DateTime<Utc>,
    #[serde(default)]
    attempt: u32,
}

impl Task {
    /// Start building a task with a fresh id.
    pub fn builder(location: Location) -> TaskBuilder {
        TaskBuilder {
            task_id: TaskId::generate(),
            location,
            payload: Vec::new(),
            context: TaskContext::default(),
            created_at: Utc::now(),
            attempt: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> &TaskId {
        &self.task_id
    }

    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }

    #[must_use]
    pub fn payload(&self) -> &[MessagePart] {
        &self.payload
    }

    #[must_use]
    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Redelivery counter; zero on first delivery.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the broker has delivered this task before.
    #[must_use]
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 0
    }

    /// All text parts joined by newlines.
    #[must_use]
    pub fn text(&self) -> String {
        self.payload
            .iter()
            .filter_map(MessagePart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Stamp the broker's delivery count onto a received task.
    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Edit this task while keeping its identity.
    #[must_use]
    pub fn revise(&self) -> TaskBuilder {
        TaskBuilder {
            task_id: self.task_id.clone(),
            location: self.location.clone(),
            payload: self.payload.clone(),
            context: self.context.clone(),
            created_at: self.created_at,
            attempt: self.attempt,
        }
    }

    /// Build the `index`-th follow-up: derived id, same location and
    /// context, empty payload, fresh timestamp.
    #[must_use]
    pub fn follow_up(&self, index: usize) -> TaskBuilder {
        TaskBuilder {
            task_id: self.task_id.derive(index),
            location: self.location.clone(),
            payload: Vec::new(),
            context: TaskContext {
                pending_call: None,
                ..self.context.clone()
            },
            created_at: Utc::now(),
            attempt: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.task_id.as_str().is_empty() {
            return Err(SchemaError::EmptyTaskId);
        }
        if self.payload.is_empty() {
            return Err(SchemaError::EmptyPayload);
        }
        self.location.validate()
    }

    /// Serialize to a JSON envelope after validating.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse and validate a JSON envelope.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let task: Self = serde_json::from_slice(bytes)?;
        task.validate()?;
        Ok(task)
    }
}

// ── TaskBuilder ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TaskBuilder {
    task_id: TaskId,
    location: Location,
    payload: Vec<MessagePart>,
    context: TaskContext,
    created_at: DateTime<Utc>,
    attempt: u32,
}

impl TaskBuilder {
    #[must_use]
    pub fn id(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = task_id.into();
        self
    }

    #[must_use]
    pub fn location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.payload.push(MessagePart::text(text));
        self
    }

    #[must_use]
    pub fn part(mut self, part: MessagePart) -> Self {
        self.payload.push(part);
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: Vec<MessagePart>) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn map_context(mut self, f: impl FnOnce(&mut TaskContext)) -> Self {
        f(&mut self.context);
        self
    }

    /// Rewrite every text part in place.
    #[must_use]
    pub fn map_text(mut self, f: impl Fn(&str) -> String) -> Self {
        for part in &mut self.payload {
            if let MessagePart::Text { text } = part {
                *text = f(text);
            }
        }
        self
    }

    pub fn build(self) -> Result<Task> {
        let task = Task {
            task_id: self.task_id,
            location: self.location,
            payload: self.payload,
            context: self.context,
            created_at: self.created_at,
            attempt: self.attempt,
        };
        task.validate()?;
        Ok(task)
    }
}
