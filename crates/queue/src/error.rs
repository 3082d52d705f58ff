use switchyard_protocol::SchemaError;

use crate::ack::DeliveryTag;

/// Failure to hand a task to the broker.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The broker connection is down. Safe to retry with backoff.
    #[error("broker unreachable while publishing to {queue}")]
    Unreachable { queue: String },

    /// The task failed validation before it was sent. Never retried.
    #[error("task rejected before publish: {0}")]
    Invalid(#[from] SchemaError),
}

impl PublishError {
    #[must_use]
    pub fn unreachable(queue: impl Into<String>) -> Self {
        Self::Unreachable {
            queue: queue.into(),
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

/// Terminal signal on a subscription. The caller resubscribes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsumeError {
    #[error("connection lost while consuming {queue}")]
    ConnectionLost { queue: String },
}

impl ConsumeError {
    #[must_use]
    pub fn connection_lost(queue: impl Into<String>) -> Self {
        Self::ConnectionLost {
            queue: queue.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Consume(#[from] ConsumeError),

    /// The delivery was settled already or was reclaimed by the broker
    /// after a disconnect.
    #[error("delivery {tag} is no longer outstanding")]
    UnknownDelivery { tag: DeliveryTag },
}

pub type Result<T> = std::result::Result<T, QueueError>;
