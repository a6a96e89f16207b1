//! Aggregator service library
//!
//! Receives kernel dispatch trace batches from GPU tracers over HTTP, keeps
//! per-kernel statistics and exposes them as Prometheus metrics.

pub mod audit;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod server;
