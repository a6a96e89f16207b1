//! Device counter sampling
//!
//! Resolves ordered counter-name requests into provider profiles, sizes the
//! raw record buffer from the counters' dimensions, and sums raw per-instance
//! records into one value per requested counter.

pub mod aggregate;
pub mod cache;
pub mod collector;
pub mod registry;
pub mod sampler;

pub use aggregate::{aggregate, CounterAggregator};
pub use cache::{Profile, ProfileCache};
pub use collector::{CounterCollector, CounterSets};
pub use registry::SamplerRegistry;
pub use sampler::{DeviceSampler, SamplerState};
