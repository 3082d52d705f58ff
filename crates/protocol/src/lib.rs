//! Task envelope definitions shared by the sender and receiver halves.
//!
//! A [`Task`] is the unit of work that flows through the queue. It carries
//! its addressing ([`Location`]), one or more [`MessagePart`]s and an
//! opaque [`TaskContext`] that only the dispatcher and engine read.
//!
//! Envelopes are JSON. Optional fields are omitted rather than written as
//! `null`, so an absent `thread_id` never reaches a numeric parser.

pub mod context;
pub mod error;
pub mod location;
pub mod task;

pub use {
    context::{PendingCall, TaskContext, ToolResponse},
    error::{Result, SchemaError},
    location::{DeliveryTarget, Location, Platform},
    task::{FileRef, MessagePart, Task, TaskBuilder, TaskId},
};

// ── Constants ────────────────────────────────────────────────────────────────

/// Logical queue that platform adapters publish user input to.
pub const RECEIVER_INBOUND: &str = "receiver.inbound";
/// Logical queue the receiver publishes responses to for delivery.
pub const SENDER_OUTBOUND: &str = "sender.outbound";
/// Suffix appended to a queue name to form its dead-letter destination.
pub const DEAD_LETTER_SUFFIX: &str = ".dead_letter";

pub const DEFAULT_MAX_REDELIVERIES: u32 = 5;
pub const DEDUPE_TTL_MS: u64 = 300_000; // 5 min
pub const DEDUPE_MAX_ENTRIES: usize = 1_000;
pub const DEFAULT_MAX_CHAIN_DEPTH: u32 = 4;

/// Dead-letter destination for `queue`.
#[must_use]
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{queue}{DEAD_LETTER_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_letter_name_appends_suffix() {
        assert_eq!(
            dead_letter_queue(RECEIVER_INBOUND),
            "receiver.inbound.dead_letter"
        );
    }
}
