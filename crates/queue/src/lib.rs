//! Queue client abstraction.
//!
//! Producers [`publish`](QueueClient::publish) validated [`Task`]s to named
//! queues; consumers receive a [`Subscription`] of [`Delivery`] values, each
//! carrying an [`AckHandle`] that must be settled exactly once. A handle
//! dropped without a decision is treated as a failed delivery and goes back
//! through the [`RetryPolicy`], so a worker that gives up on a task never
//! loses it.
//!
//! Delivery is at-least-once. Consumers must expect duplicates; a delivery
//! with `attempt > 0` is known to be one.
//!
//! [`Task`]: switchyard_protocol::Task

pub mod ack;
pub mod client;
pub mod error;
pub mod memory;
pub mod retry;

pub use {
    ack::{AckDecision, AckHandle, Acknowledger, DeliveryTag, DeliveryTracker, InFlight, Settlement},
    client::{Delivery, QueueClient, Subscription},
    error::{ConsumeError, PublishError, QueueError, Result},
    memory::InMemoryBroker,
    retry::{Backoff, RetryPolicy, RetryVerdict, publish_with_backoff},
};
