//! Timer producers: publish a configured task on a fixed interval.

use std::sync::Arc;

use {
    serde_json::Value,
    switchyard_config::ScheduleConfig,
    switchyard_protocol::{Task, TaskId},
    switchyard_queue::{Backoff, QueueClient, publish_with_backoff},
    tokio::{
        task::JoinHandle,
        time::{Instant, MissedTickBehavior},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::error::Result;

pub struct TimerProducer {
    schedule: ScheduleConfig,
    queue: Arc<dyn QueueClient>,
    backoff: Backoff,
}

impl TimerProducer {
    pub fn new(schedule: ScheduleConfig, queue: Arc<dyn QueueClient>, backoff: Backoff) -> Self {
        Self {
            schedule,
            queue,
            backoff,
        }
    }

    /// A fresh task for one tick. Carries the schedule name in
    /// `context.metadata["schedule"]`.
    pub fn build_task(&self) -> Result<Task> {
        let name = self.schedule.name.clone();
        Ok(Task::builder(self.schedule.location())
            .text(&self.schedule.text)
            .map_context(|c| {
                c.metadata.insert("schedule".into(), Value::String(name));
            })
            .build()?)
    }

    pub async fn fire(&self) -> Result<TaskId> {
        let task = self.build_task()?;
        publish_with_backoff(self.queue.as_ref(), &self.schedule.queue, &task, &self.backoff).await?;
        debug!(task_id = %task.id(), schedule = %self.schedule.name, queue = %self.schedule.queue, "scheduled task published");
        Ok(task.id().clone())
    }

    /// Fire every interval, starting one interval from now.
    pub async fn run(self, cancel: CancellationToken) {
        let period = self.schedule.interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(schedule = %self.schedule.name, every_secs = period.as_secs(), "timer started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.fire().await {
                        warn!(schedule = %self.schedule.name, error = %e, "scheduled publish failed");
                    }
                },
            }
        }
        debug!(schedule = %self.schedule.name, "timer stopped");
    }
}

/// Spawn one producer per schedule.
pub fn spawn_timers(
    schedules: &[ScheduleConfig],
    queue: &Arc<dyn QueueClient>,
    backoff: Backoff,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    schedules
        .iter()
        .map(|schedule| {
            let producer = TimerProducer::new(schedule.clone(), Arc::clone(queue), backoff);
            tokio::spawn(producer.run(cancel.clone()))
        })
        .collect()
}
