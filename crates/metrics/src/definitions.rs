//! Metric name and label definitions.

/// Queue client metrics
pub mod queue {
    /// Tasks accepted by the broker
    pub const PUBLISHED_TOTAL: &str = "switchyard_queue_published_total";
    /// Publish attempts that failed with the broker unreachable
    pub const PUBLISH_FAILURES_TOTAL: &str = "switchyard_queue_publish_failures_total";
    /// Deliveries handed to consumers
    pub const DELIVERED_TOTAL: &str = "switchyard_queue_delivered_total";
    /// Deliveries acknowledged
    pub const ACKED_TOTAL: &str = "switchyard_queue_acked_total";
    /// Deliveries put back on their queue
    pub const REQUEUED_TOTAL: &str = "switchyard_queue_requeued_total";
    /// Deliveries routed to a dead-letter queue
    pub const DEAD_LETTERED_TOTAL: &str = "switchyard_queue_dead_lettered_total";
    /// Deliveries currently awaiting a decision
    pub const IN_FLIGHT: &str = "switchyard_queue_in_flight";
}

/// Dispatcher and plugin metrics
pub mod plugins {
    /// Plugin action invocations
    pub const RUNS_TOTAL: &str = "switchyard_plugin_runs_total";
    /// Declared plugin failures
    pub const DECLARED_FAILURES_TOTAL: &str = "switchyard_plugin_declared_failures_total";
    /// Unexpected plugin failures, panics included
    pub const UNEXPECTED_FAILURES_TOTAL: &str = "switchyard_plugin_unexpected_failures_total";
    /// Plugin action duration in seconds
    pub const RUN_DURATION_SECONDS: &str = "switchyard_plugin_run_duration_seconds";
    /// Pipelines halted by a hook
    pub const HOOK_STOPS_TOTAL: &str = "switchyard_plugin_hook_stops_total";
}

/// Worker and result sink metrics
pub mod worker {
    /// Tasks processed by a worker
    pub const TASKS_TOTAL: &str = "switchyard_worker_tasks_total";
    /// Tasks skipped as already finalized
    pub const DUPLICATES_SKIPPED_TOTAL: &str = "switchyard_worker_duplicates_skipped_total";
    /// Tasks abandoned after the deadline
    pub const DEADLINE_EXCEEDED_TOTAL: &str = "switchyard_worker_deadline_exceeded_total";
    /// Task processing duration in seconds
    pub const TASK_DURATION_SECONDS: &str = "switchyard_worker_task_duration_seconds";
    /// Outbound tasks delivered to platform adapters
    pub const DELIVERED_TOTAL: &str = "switchyard_worker_delivered_total";
}

/// Common label keys
pub mod labels {
    pub const QUEUE: &str = "queue";
    pub const PLUGIN: &str = "plugin";
    pub const PLATFORM: &str = "platform";
    pub const ROLE: &str = "role";
}
