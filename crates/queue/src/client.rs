use std::pin::Pin;

use {async_trait::async_trait, futures::Stream, switchyard_protocol::Task};

use crate::{
    ack::AckHandle,
    error::{ConsumeError, PublishError},
};

/// A received task and the handle that settles it.
#[derive(Debug)]
pub struct Delivery {
    pub task: Task,
    pub ack: AckHandle,
}

impl Delivery {
    #[must_use]
    pub fn into_parts(self) -> (Task, AckHandle) {
        (self.task, self.ack)
    }
}

/// Unbounded stream of deliveries. Ends after yielding
/// [`ConsumeError::ConnectionLost`]; the caller resubscribes.
pub type Subscription = Pin<Box<dyn Stream<Item = Result<Delivery, ConsumeError>> + Send>>;

/// Publish/consume against named queues.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Validate and publish `task` to `queue`.
    async fn publish(&self, queue: &str, task: &Task) -> Result<(), PublishError>;

    /// Subscribe to `queue`.
    async fn consume(&self, queue: &str) -> Result<Subscription, ConsumeError>;
}
