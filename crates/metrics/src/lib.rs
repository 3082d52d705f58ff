//! Metric names for switchyard.
//!
//! Crates record through the `metrics` facade and only when built with their
//! own `metrics` feature. Installing a recorder/exporter is left to the
//! embedding process.
//!
//! ```rust,ignore
//! use switchyard_metrics::{counter, queue};
//!
//! counter!(queue::PUBLISHED_TOTAL, "queue" => "sender.outbound").increment(1);
//! ```

mod definitions;

pub use definitions::*;

pub use metrics::{counter, gauge, histogram};
