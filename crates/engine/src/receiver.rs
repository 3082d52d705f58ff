//! Receiver role: plan, execute and finalize each inbound task.

use std::time::{Duration, Instant};

use {
    async_trait::async_trait,
    switchyard_plugins::Dispatcher,
    switchyard_protocol::Task,
    switchyard_queue::Delivery,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use switchyard_metrics::{counter, histogram, labels, worker as worker_metrics};

use crate::{
    dedupe::RecentTasks,
    engine::{Disposition, ExecutionEngine},
    sink::ResultSink,
    worker::{DeliveryHandler, WorkerSettings, log_settlement},
};

pub struct ReceiverWorker {
    dispatcher: Dispatcher,
    engine: ExecutionEngine,
    sink: ResultSink,
    deadline: Duration,
}

impl ReceiverWorker {
    pub fn new(dispatcher: Dispatcher, sink: ResultSink, settings: &WorkerSettings) -> Self {
        Self {
            dispatcher,
            engine: ExecutionEngine::new(),
            sink,
            deadline: settings.deadline,
        }
    }

    #[must_use]
    pub fn recent(&self) -> &RecentTasks {
        self.sink.recent()
    }

    /// Run one task through the pipeline without touching its delivery.
    pub async fn process(&self, task: Task) -> Disposition {
        let plan = self.dispatcher.plan(task).await;
        let output = self.engine.run(plan).await;
        if output.disposition != Disposition::Ack {
            return output.disposition;
        }
        match self.sink.finalize(&output.task, output.emits).await {
            Ok(_) => Disposition::Ack,
            Err(e) => Disposition::Reject {
                reason: e.to_string(),
            },
        }
    }
}

#[async_trait]
impl DeliveryHandler for ReceiverWorker {
    fn role(&self) -> &'static str {
        "receiver"
    }

    async fn handle(&self, delivery: Delivery) {
        let (task, ack) = delivery.into_parts();
        let task_id = task.id().clone();

        if self.recent().contains(&task_id) {
            debug!(task_id = %task_id, attempt = ack.attempt(), "duplicate delivery skipped");
            #[cfg(feature = "metrics")]
            counter!(worker_metrics::DUPLICATES_SKIPPED_TOTAL, labels::ROLE => "receiver").increment(1);
            log_settlement(&task_id, ack.ack().await);
            return;
        }

        let started = Instant::now();
        match tokio::time::timeout(self.deadline, self.process(task)).await {
            Ok(Disposition::Ack) => log_settlement(&task_id, ack.ack().await),
            Ok(Disposition::Reject { reason }) => {
                warn!(task_id = %task_id, attempt = ack.attempt(), %reason, "task rejected");
                log_settlement(&task_id, ack.reject().await);
            },
            Err(_) => {
                warn!(
                    task_id = %task_id,
                    deadline_secs = self.deadline.as_secs(),
                    "task deadline exceeded, leaving it to redelivery"
                );
                #[cfg(feature = "metrics")]
                counter!(worker_metrics::DEADLINE_EXCEEDED_TOTAL, labels::ROLE => "receiver").increment(1);
                drop(ack);
            },
        }

        #[cfg(feature = "metrics")]
        {
            counter!(worker_metrics::TASKS_TOTAL, labels::ROLE => "receiver").increment(1);
            histogram!(worker_metrics::TASK_DURATION_SECONDS, labels::ROLE => "receiver")
                .record(started.elapsed().as_secs_f64());
        }
        debug!(task_id = %task_id, elapsed_ms = started.elapsed().as_millis() as u64, "task handled");
    }
}
