//! GPU telemetry
//!
//! Two engines sit on top of an injected hardware profiling provider:
//!
//! - [`counters`]: device counter sampling. Callers name the counters they
//!   want per GPU and get back one aggregated value per counter.
//! - [`trace`]: kernel dispatch tracing. Every kernel execution is recorded
//!   with its device node, demangled name and timestamps, then posted in CSV
//!   batches to an HTTP endpoint.
//!
//! The provider itself is abstracted behind the traits in [`provider`].

pub mod config;
pub mod counters;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod trace;

pub use config::TraceConfig;
pub use counters::{CounterCollector, CounterSets, DeviceSampler, SamplerRegistry, SamplerState};
pub use error::{ConfigError, ProviderError, SamplerError, SinkError, TraceError};
pub use provider::{BufferConfig, BufferPolicy, CounterProvider, TraceCallbacks, TraceProvider};
pub use trace::{FlushSink, FlushSummary, HttpSink, KernelTracer, TracerState};
