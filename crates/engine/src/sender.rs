//! Sender role: hand outbound tasks to platform adapters.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    switchyard_protocol::{DeliveryTarget, Platform, Task},
    switchyard_queue::Delivery,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use switchyard_metrics::{counter, labels, worker as worker_metrics};

use crate::{
    dedupe::RecentTasks,
    error::EngineError,
    worker::{DeliveryHandler, WorkerSettings, log_settlement},
};

/// Wire client for one chat platform.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Post `task` at `target`. A channel target must be posted to the chat
    /// directly; there is no thread handle to convert.
    async fn deliver(&self, target: DeliveryTarget<'_>, task: &Task) -> anyhow::Result<()>;
}

#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` for its platform, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        let platform = adapter.platform();
        if self.adapters.insert(platform, adapter).is_some() {
            warn!(%platform, "platform adapter replaced");
        }
    }

    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<&Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform)
    }

    #[must_use]
    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<_> = self.adapters.keys().copied().collect();
        platforms.sort();
        platforms
    }
}

pub struct SenderWorker {
    adapters: AdapterRegistry,
    delivered: RecentTasks,
    deadline: Duration,
}

impl SenderWorker {
    pub fn new(adapters: AdapterRegistry, delivered: RecentTasks, settings: &WorkerSettings) -> Self {
        Self {
            adapters,
            delivered,
            deadline: settings.deadline,
        }
    }

    async fn deliver(&self, task: &Task) -> Result<(), EngineError> {
        let platform = task.location().platform;
        let adapter = self
            .adapters
            .get(platform)
            .ok_or(EngineError::NoAdapter { platform })?;
        adapter
            .deliver(task.location().delivery_target(), task)
            .await
            .map_err(|e| EngineError::delivery(platform, task.id(), e))
    }
}

#[async_trait]
impl DeliveryHandler for SenderWorker {
    fn role(&self) -> &'static str {
        "sender"
    }

    async fn handle(&self, delivery: Delivery) {
        let (task, ack) = delivery.into_parts();
        let task_id = task.id().clone();

        if !self.delivered.claim(&task_id) {
            debug!(task_id = %task_id, attempt = ack.attempt(), "already delivered, skipping");
            #[cfg(feature = "metrics")]
            counter!(worker_metrics::DUPLICATES_SKIPPED_TOTAL, labels::ROLE => "sender").increment(1);
            log_settlement(&task_id, ack.ack().await);
            return;
        }

        let started = Instant::now();
        match tokio::time::timeout(self.deadline, self.deliver(&task)).await {
            Ok(Ok(())) => {
                info!(
                    task_id = %task_id,
                    target = %task.location(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "task delivered"
                );
                #[cfg(feature = "metrics")]
                counter!(worker_metrics::DELIVERED_TOTAL, labels::PLATFORM => task.location().platform.as_str())
                    .increment(1);
                log_settlement(&task_id, ack.ack().await);
            },
            Ok(Err(e @ EngineError::NoAdapter { .. })) => {
                self.delivered.release(&task_id);
                log_settlement(&task_id, ack.dead_letter(e.to_string()).await);
            },
            Ok(Err(e)) => {
                self.delivered.release(&task_id);
                warn!(task_id = %task_id, attempt = ack.attempt(), error = %e, "delivery failed");
                log_settlement(&task_id, ack.reject().await);
            },
            Err(_) => {
                self.delivered.release(&task_id);
                warn!(task_id = %task_id, deadline_secs = self.deadline.as_secs(), "delivery deadline exceeded");
                drop(ack);
            },
        }
    }
}
