//! Acknowledgment handles and per-delivery bookkeeping.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use {async_trait::async_trait, switchyard_protocol::TaskId, tracing::debug};

use crate::error::Result;

/// Broker-level identifier of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTag(u64);

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The consumer's verdict on a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckDecision {
    /// Processed; remove from the broker.
    Ack,
    /// Not processed; requeue, or dead-letter once the ceiling is reached.
    Reject,
    /// Never retry; route straight to the dead-letter queue.
    DeadLetter { reason: String },
}

/// What the broker did with a settled delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Requeued { attempt: u32 },
    DeadLettered { queue: String },
}

/// Broker side of an [`AckHandle`].
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn settle(&self, tag: DeliveryTag, decision: AckDecision) -> Result<Settlement>;

    /// The handle was dropped without a decision. Must not block.
    fn abandon(&self, tag: DeliveryTag);
}

/// Settles one delivery. Consumed by every decision, so a delivery can be
/// acked or rejected once and never both.
pub struct AckHandle {
    tag: DeliveryTag,
    task_id: TaskId,
    attempt: u32,
    acker: Arc<dyn Acknowledger>,
    settled: bool,
}

impl AckHandle {
    pub fn new(tag: DeliveryTag, task_id: TaskId, attempt: u32, acker: Arc<dyn Acknowledger>) -> Self {
        Self {
            tag,
            task_id,
            attempt,
            acker,
            settled: false,
        }
    }

    #[must_use]
    pub fn tag(&self) -> DeliveryTag {
        self.tag
    }

    #[must_use]
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub async fn ack(self) -> Result<Settlement> {
        self.decide(AckDecision::Ack).await
    }

    pub async fn reject(self) -> Result<Settlement> {
        self.decide(AckDecision::Reject).await
    }

    pub async fn dead_letter(self, reason: impl Into<String>) -> Result<Settlement> {
        self.decide(AckDecision::DeadLetter {
            reason: reason.into(),
        })
        .await
    }

    pub async fn decide(mut self, decision: AckDecision) -> Result<Settlement> {
        self.settled = true;
        self.acker.settle(self.tag, decision).await
    }
}

impl Drop for AckHandle {
    fn drop(&mut self) {
        if !self.settled {
            debug!(task_id = %self.task_id, tag = %self.tag, "ack handle dropped without a decision");
            self.acker.abandon(self.tag);
        }
    }
}

impl fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckHandle")
            .field("tag", &self.tag)
            .field("task_id", &self.task_id)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

// ── DeliveryTracker ─────────────────────────────────────────────────────────

/// An outstanding delivery: the task it carries and its redelivery count,
/// plus whatever the broker needs to put it back.
#[derive(Debug, Clone)]
pub struct InFlight<P> {
    pub task_id: TaskId,
    pub attempt: u32,
    pub payload: P,
}

/// Maps delivery tags to in-flight deliveries. Removing an entry is the
/// single point where a decision is taken, so each tag settles once.
pub struct DeliveryTracker<P> {
    next_tag: AtomicU64,
    entries: Mutex<HashMap<DeliveryTag, InFlight<P>>>,
}

impl<P> Default for DeliveryTracker<P> {
    fn default() -> Self {
        Self {
            next_tag: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<P> DeliveryTracker<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, task_id: TaskId, attempt: u32, payload: P) -> DeliveryTag {
        let tag = DeliveryTag(self.next_tag.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(tag, InFlight {
            task_id,
            attempt,
            payload,
        });
        tag
    }

    /// Take the entry for `tag`. `None` if it was settled before.
    pub fn settle(&self, tag: DeliveryTag) -> Option<InFlight<P>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(&tag)
    }

    /// Take every outstanding entry, oldest first.
    pub fn drain(&self) -> Vec<(DeliveryTag, InFlight<P>)> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut drained: Vec<_> = entries.drain().collect();
        drained.sort_by_key(|(tag, _)| *tag);
        drained
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
