//! Shared error helpers and small utilities used across all switchyard crates.

pub mod error;
pub mod time;

pub use error::FromMessage;
