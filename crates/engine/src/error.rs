use {
    switchyard_protocol::{Platform, SchemaError, TaskId},
    switchyard_queue::{ConsumeError, PublishError, QueueError},
};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Consume(#[from] ConsumeError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("no adapter registered for platform {platform}")]
    NoAdapter { platform: Platform },

    #[error("adapter for {platform} failed to deliver {task_id}")]
    Delivery {
        platform: Platform,
        task_id: TaskId,
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    #[must_use]
    pub fn delivery(platform: Platform, task_id: &TaskId, source: anyhow::Error) -> Self {
        Self::Delivery {
            platform,
            task_id: task_id.clone(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
