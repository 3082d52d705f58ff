//! In-process broker with at-least-once semantics.
//!
//! Used by the binary's single-process mode and by tests. Messages live in
//! per-queue FIFOs; each delivery is tracked until settled. Disconnecting
//! ends every open subscription and puts in-flight deliveries back as
//! redeliveries, the way a real broker does when a channel dies.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use {
    async_trait::async_trait,
    switchyard_protocol::{DEAD_LETTER_SUFFIX, Task},
    tokio::sync::Notify,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use switchyard_metrics::{counter, gauge, labels, queue as queue_metrics};

use crate::{
    ack::{AckDecision, AckHandle, Acknowledger, DeliveryTag, DeliveryTracker, InFlight, Settlement},
    client::{Delivery, QueueClient, Subscription},
    error::{ConsumeError, PublishError, QueueError, Result},
    retry::{RetryPolicy, RetryVerdict},
};

#[derive(Debug, Clone)]
struct Envelope {
    bytes: Vec<u8>,
    attempt: u32,
}

/// Broker-side payload of an in-flight delivery.
#[derive(Debug, Clone)]
struct Origin {
    queue: String,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct State {
    queues: HashMap<String, VecDeque<Envelope>>,
    connected: bool,
    /// Bumped on every disconnect; subscriptions from an older epoch end.
    epoch: u64,
}

struct Inner {
    state: Mutex<State>,
    notify: Notify,
    tracker: DeliveryTracker<Origin>,
    policy: RetryPolicy,
    dead_letter_suffix: String,
}

#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl InMemoryBroker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_dead_letter_suffix(policy, DEAD_LETTER_SUFFIX)
    }

    /// An empty suffix falls back to [`DEAD_LETTER_SUFFIX`]; parked tasks
    /// never land back on their source queue.
    pub fn with_dead_letter_suffix(policy: RetryPolicy, suffix: impl Into<String>) -> Self {
        let mut suffix = suffix.into();
        if suffix.is_empty() {
            warn!("empty dead-letter suffix, using {DEAD_LETTER_SUFFIX}");
            suffix = DEAD_LETTER_SUFFIX.to_string();
        }
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queues: HashMap::new(),
                    connected: true,
                    epoch: 0,
                }),
                notify: Notify::new(),
                tracker: DeliveryTracker::new(),
                policy,
                dead_letter_suffix: suffix,
            }),
        }
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    #[must_use]
    pub fn dead_letter_queue(&self, queue: &str) -> String {
        self.inner.dead_letter_queue(queue)
    }

    /// Drop the connection: open subscriptions end with `ConnectionLost`,
    /// publishes fail with `Unreachable` and in-flight deliveries are
    /// redelivered (or dead-lettered at the ceiling).
    pub fn disconnect(&self) {
        {
            let mut state = self.inner.lock();
            if !state.connected {
                return;
            }
            state.connected = false;
            state.epoch += 1;
        }
        let reclaimed = self.inner.tracker.drain();
        debug!(reclaimed = reclaimed.len(), "broker disconnected");
        self.inner.report_in_flight();
        for (_, inflight) in reclaimed {
            self.inner.retry_or_dead_letter(inflight, "connection lost");
        }
        self.inner.notify.notify_waiters();
    }

    pub fn reconnect(&self) {
        self.inner.lock().connected = true;
        debug!("broker reconnected");
        self.inner.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    /// Enqueue raw bytes without validation.
    pub fn publish_bytes(&self, queue: &str, bytes: Vec<u8>) {
        self.inner.enqueue(queue, Envelope { bytes, attempt: 0 });
    }

    /// Messages waiting on `queue`, not counting in-flight deliveries.
    #[must_use]
    pub fn depth(&self, queue: &str) -> usize {
        self.inner
            .lock()
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Remove and decode everything waiting on `queue`. Undecodable
    /// messages are skipped.
    pub fn drain(&self, queue: &str) -> Vec<Task> {
        let envelopes: Vec<Envelope> = self
            .inner
            .lock()
            .queues
            .get_mut(queue)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default();
        envelopes
            .into_iter()
            .filter_map(|e| Task::decode(&e.bytes).ok().map(|t| t.with_attempt(e.attempt)))
            .collect()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dead_letter_queue(&self, queue: &str) -> String {
        format!("{queue}{}", self.dead_letter_suffix)
    }

    fn enqueue(&self, queue: &str, envelope: Envelope) {
        self.lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(envelope);
        self.notify.notify_waiters();
    }

    /// Wait for the next message on `queue`. `None` once the subscription's
    /// epoch is over.
    async fn next(self: &Arc<Self>, queue: &str, epoch: u64) -> Option<Delivery> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let popped = {
                let mut state = self.lock();
                if !state.connected || state.epoch != epoch {
                    return None;
                }
                state.queues.get_mut(queue).and_then(VecDeque::pop_front)
            };

            match popped {
                Some(envelope) => {
                    if let Some(delivery) = self.open(queue, envelope) {
                        return Some(delivery);
                    }
                },
                None => notified.await,
            }
        }
    }

    /// Decode an envelope into a tracked delivery. Undecodable bytes can
    /// never succeed, so they go straight to dead-letter.
    fn open(self: &Arc<Self>, queue: &str, envelope: Envelope) -> Option<Delivery> {
        let task = match Task::decode(&envelope.bytes) {
            Ok(task) => task.with_attempt(envelope.attempt),
            Err(e) => {
                let dead_letter = self.dead_letter_queue(queue);
                warn!(queue, dead_letter = %dead_letter, error = %e, "undecodable message dead-lettered");
                #[cfg(feature = "metrics")]
                counter!(queue_metrics::DEAD_LETTERED_TOTAL, labels::QUEUE => queue.to_string())
                    .increment(1);
                self.enqueue(&dead_letter, envelope);
                return None;
            },
        };

        let tag = self.tracker.begin(task.id().clone(), envelope.attempt, Origin {
            queue: queue.to_string(),
            bytes: envelope.bytes,
        });
        debug!(task_id = %task.id(), queue, attempt = envelope.attempt, tag = %tag, "delivering task");
        #[cfg(feature = "metrics")]
        counter!(queue_metrics::DELIVERED_TOTAL, labels::QUEUE => queue.to_string()).increment(1);
        self.report_in_flight();

        let acker: Arc<dyn Acknowledger> = self.clone();
        let ack = AckHandle::new(tag, task.id().clone(), envelope.attempt, acker);
        Some(Delivery { task, ack })
    }

    fn report_in_flight(&self) {
        #[cfg(feature = "metrics")]
        gauge!(queue_metrics::IN_FLIGHT).set(self.tracker.len() as f64);
    }

    fn retry_or_dead_letter(&self, inflight: InFlight<Origin>, reason: &str) -> Settlement {
        match self.policy.on_failure(inflight.attempt) {
            RetryVerdict::Requeue { attempt } => {
                debug!(
                    task_id = %inflight.task_id,
                    queue = %inflight.payload.queue,
                    attempt,
                    reason,
                    "requeueing task"
                );
                #[cfg(feature = "metrics")]
                counter!(queue_metrics::REQUEUED_TOTAL, labels::QUEUE => inflight.payload.queue.clone())
                    .increment(1);
                self.enqueue(&inflight.payload.queue, Envelope {
                    bytes: inflight.payload.bytes,
                    attempt,
                });
                Settlement::Requeued { attempt }
            },
            RetryVerdict::DeadLetter => self.dead_letter(
                inflight,
                &format!(
                    "{reason}; redelivery ceiling of {} reached",
                    self.policy.max_redeliveries
                ),
            ),
        }
    }

    fn dead_letter(&self, inflight: InFlight<Origin>, reason: &str) -> Settlement {
        let queue = self.dead_letter_queue(&inflight.payload.queue);
        warn!(
            task_id = %inflight.task_id,
            queue = %inflight.payload.queue,
            dead_letter = %queue,
            attempt = inflight.attempt,
            reason,
            "task dead-lettered"
        );
        #[cfg(feature = "metrics")]
        counter!(queue_metrics::DEAD_LETTERED_TOTAL, labels::QUEUE => inflight.payload.queue.clone())
            .increment(1);
        self.enqueue(&queue, Envelope {
            bytes: inflight.payload.bytes,
            attempt: inflight.attempt,
        });
        Settlement::DeadLettered { queue }
    }
}

#[async_trait]
impl Acknowledger for Inner {
    async fn settle(&self, tag: DeliveryTag, decision: AckDecision) -> Result<Settlement> {
        let inflight = self
            .tracker
            .settle(tag)
            .ok_or(QueueError::UnknownDelivery { tag })?;
        self.report_in_flight();
        let settlement = match decision {
            AckDecision::Ack => {
                debug!(task_id = %inflight.task_id, tag = %tag, "task acked");
                #[cfg(feature = "metrics")]
                counter!(queue_metrics::ACKED_TOTAL, labels::QUEUE => inflight.payload.queue.clone())
                    .increment(1);
                Settlement::Acked
            },
            AckDecision::Reject => self.retry_or_dead_letter(inflight, "rejected by consumer"),
            AckDecision::DeadLetter { reason } => self.dead_letter(inflight, &reason),
        };
        Ok(settlement)
    }

    fn abandon(&self, tag: DeliveryTag) {
        if let Some(inflight) = self.tracker.settle(tag) {
            self.report_in_flight();
            self.retry_or_dead_letter(inflight, "abandoned without a decision");
        }
    }
}

#[async_trait]
impl QueueClient for InMemoryBroker {
    async fn publish(&self, queue: &str, task: &Task) -> std::result::Result<(), PublishError> {
        let bytes = task.encode()?;
        if !self.is_connected() {
            #[cfg(feature = "metrics")]
            counter!(queue_metrics::PUBLISH_FAILURES_TOTAL, labels::QUEUE => queue.to_string())
                .increment(1);
            return Err(PublishError::unreachable(queue));
        }
        debug!(task_id = %task.id(), queue, "task published");
        #[cfg(feature = "metrics")]
        counter!(queue_metrics::PUBLISHED_TOTAL, labels::QUEUE => queue.to_string()).increment(1);
        self.inner.enqueue(queue, Envelope { bytes, attempt: 0 });
        Ok(())
    }

    async fn consume(&self, queue: &str) -> std::result::Result<Subscription, ConsumeError> {
        let epoch = {
            let state = self.inner.lock();
            if !state.connected {
                return Err(ConsumeError::connection_lost(queue));
            }
            state.epoch
        };
        let inner = Arc::clone(&self.inner);
        let queue = queue.to_string();
        Ok(Box::pin(async_stream::stream! {
            loop {
                match inner.next(&queue, epoch).await {
                    Some(delivery) => yield Ok(delivery),
                    None => {
                        yield Err(ConsumeError::connection_lost(&queue));
                        break;
                    },
                }
            }
        }))
    }
}
