//! Consumer loops shared by the receiver and sender roles.
//!
//! Each role runs `concurrency` independent loops against its queue. A loop
//! resubscribes after `ConnectionLost`, waiting `reconnect_delay` between
//! attempts, until the cancellation token fires.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    futures::StreamExt,
    switchyard_config::SwitchyardConfig,
    switchyard_protocol::TaskId,
    switchyard_queue::{Delivery, QueueClient, QueueError, Settlement},
    tokio::task::JoinSet,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub queue: String,
    pub concurrency: usize,
    pub deadline: Duration,
    pub reconnect_delay: Duration,
}

impl WorkerSettings {
    pub fn receiver(config: &SwitchyardConfig) -> Self {
        Self::for_queue(config, &config.queue.inbound_queue)
    }

    pub fn sender(config: &SwitchyardConfig) -> Self {
        Self::for_queue(config, &config.queue.outbound_queue)
    }

    fn for_queue(config: &SwitchyardConfig, queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            concurrency: config.worker.concurrency.max(1),
            deadline: config.worker.task_deadline(),
            reconnect_delay: config.worker.reconnect_delay(),
        }
    }
}

/// Processes one delivery and settles its handle.
#[async_trait]
pub trait DeliveryHandler: Send + Sync + 'static {
    /// Log label for this role.
    fn role(&self) -> &'static str;

    async fn handle(&self, delivery: Delivery);
}

/// Run the consumer loops until `cancel` fires.
pub async fn run_consumers<H: DeliveryHandler>(
    handler: Arc<H>,
    queue: Arc<dyn QueueClient>,
    settings: WorkerSettings,
    cancel: CancellationToken,
) {
    let mut loops = JoinSet::new();
    for worker in 0..settings.concurrency {
        loops.spawn(consume(
            Arc::clone(&handler),
            Arc::clone(&queue),
            settings.clone(),
            cancel.clone(),
            worker,
        ));
    }
    info!(role = handler.role(), queue = %settings.queue, consumers = settings.concurrency, "workers started");
    while loops.join_next().await.is_some() {}
    info!(role = handler.role(), queue = %settings.queue, "workers stopped");
}

async fn consume<H: DeliveryHandler>(
    handler: Arc<H>,
    queue: Arc<dyn QueueClient>,
    settings: WorkerSettings,
    cancel: CancellationToken,
    worker: usize,
) {
    let role = handler.role();
    while !cancel.is_cancelled() {
        match queue.consume(&settings.queue).await {
            Ok(mut subscription) => {
                debug!(role, worker, queue = %settings.queue, "subscribed");
                loop {
                    let next = tokio::select! {
                        () = cancel.cancelled() => return,
                        next = subscription.next() => next,
                    };
                    match next {
                        Some(Ok(delivery)) => handler.handle(delivery).await,
                        Some(Err(e)) => {
                            warn!(role, worker, error = %e, "subscription lost");
                            break;
                        },
                        None => break,
                    }
                }
            },
            Err(e) => warn!(role, worker, error = %e, "subscribe failed"),
        }
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(settings.reconnect_delay) => {},
        }
    }
}

/// Log the result of settling a delivery. Settling fails only when the
/// delivery was already reclaimed by the broker, e.g. after a reconnect.
pub(crate) fn log_settlement(task_id: &TaskId, result: Result<Settlement, QueueError>) {
    match result {
        Ok(settlement) => debug!(task_id = %task_id, ?settlement, "delivery settled"),
        Err(e) => warn!(task_id = %task_id, error = %e, "stale delivery could not be settled"),
    }
}
