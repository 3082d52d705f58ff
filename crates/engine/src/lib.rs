//! Execution engine, result sink and the queue-facing workers.
//!
//! The receiver side consumes inbound tasks, asks the [`Dispatcher`] for a
//! plan, runs it through the [`ExecutionEngine`] and hands the output to the
//! [`ResultSink`]. The sender side consumes outbound tasks and passes them to
//! a [`PlatformAdapter`]. Both sides tolerate redelivery through
//! [`RecentTasks`].
//!
//! [`Dispatcher`]: switchyard_plugins::Dispatcher

use std::time::Duration;

use {
    switchyard_config::QueueConfig,
    switchyard_queue::{Backoff, RetryPolicy},
};

pub mod continuation;
pub mod dedupe;
pub mod engine;
pub mod error;
pub mod history;
pub mod receiver;
pub mod sender;
pub mod sink;
pub mod timer;
pub mod worker;

pub use {
    continuation::{Continuation, Continuations},
    dedupe::{Claim, RecentTasks},
    engine::{Disposition, EngineOutput, ExecutionEngine, StepOutcome, StepRecord, unavailable_message},
    error::{EngineError, Result},
    history::{HistoryEntry, HistorySink},
    receiver::ReceiverWorker,
    sender::{AdapterRegistry, PlatformAdapter, SenderWorker},
    sink::{CHAIN_LIMIT_MESSAGE, Finalized, ResultSink},
    timer::{TimerProducer, spawn_timers},
    worker::{DeliveryHandler, WorkerSettings, run_consumers},
};

/// Publish backoff configured in `[queue]`.
#[must_use]
pub fn publish_backoff(config: &QueueConfig) -> Backoff {
    Backoff {
        base: Duration::from_millis(config.backoff_base_ms),
        max: Duration::from_millis(config.backoff_max_ms),
        retries: config.publish_retries,
    }
}

/// Redelivery ceiling configured in `[queue]`.
#[must_use]
pub fn retry_policy(config: &QueueConfig) -> RetryPolicy {
    RetryPolicy::new(config.max_redeliveries)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_config_maps_to_policies() {
        let config = QueueConfig {
            max_redeliveries: 3,
            publish_retries: 2,
            backoff_base_ms: 50,
            backoff_max_ms: 400,
            ..QueueConfig::default()
        };
        let backoff = publish_backoff(&config);
        assert_eq!(backoff.delay(0), Duration::from_millis(50));
        assert_eq!(backoff.delay(5), Duration::from_millis(400));
        assert_eq!(retry_policy(&config).max_redeliveries, 3);
    }
}
