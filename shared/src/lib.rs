//! Shared types and utilities for Lumen
//!
//! This crate contains the data structures exchanged between the telemetry
//! provider, the sampling/tracing engines in `lumen-gpu`, and the downstream
//! aggregator, including the CSV line format used for kernel trace batches.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{agent::*, counter::*, trace::*};
