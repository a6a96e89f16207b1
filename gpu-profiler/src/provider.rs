//! Telemetry provider interface
//!
//! The hardware profiling provider is an external dependency injected into the
//! engines at construction. Counter sampling pulls from it; kernel tracing is
//! driven by it through the [`TraceCallbacks`] capability that the tracer
//! registers during [`TraceProvider::configure`].

use crate::error::{ProviderError, TraceError};
use lumen_shared::{
    Agent, AgentId, CounterDescriptor, CounterId, DispatchRecord, KernelId, ProfileHandle,
    RawRecord,
};
use std::sync::Weak;

/// Device counting side of the provider
pub trait CounterProvider: Send + Sync {
    /// All agents known to the provider
    fn list_agents(&self) -> Result<Vec<Agent>, ProviderError>;

    /// Counters supported by one agent
    fn list_counters(&self, agent: AgentId) -> Result<Vec<CounterDescriptor>, ProviderError>;

    /// Materialize a native profile for an ordered list of counters
    fn create_profile(
        &self,
        agent: AgentId,
        counters: &[CounterId],
    ) -> Result<ProfileHandle, ProviderError>;

    /// Begin collecting the given profile on an agent
    fn start_collection(&self, agent: AgentId, profile: ProfileHandle)
        -> Result<(), ProviderError>;

    /// Halt collection on an agent
    fn stop_collection(&self, agent: AgentId) -> Result<(), ProviderError>;

    /// Fill `records` with the latest raw values; returns how many were written
    fn pull_samples(&self, agent: AgentId, records: &mut [RawRecord])
        -> Result<usize, ProviderError>;
}

/// Overflow policy of the provider's trace buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Block producers instead of dropping records
    Lossless,
    /// Drop records once the buffer is full
    Lossy,
}

/// Trace buffer parameters handed to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    pub size_bytes: u64,
    /// Fill level that triggers the buffer-full callback
    pub watermark_bytes: u64,
    pub policy: BufferPolicy,
}

/// Kernel dispatch tracing side of the provider
pub trait TraceProvider: Send + Sync {
    /// All agents known to the provider
    fn list_agents(&self) -> Result<Vec<Agent>, ProviderError>;

    /// Create the dispatch trace buffer and register the callback target.
    ///
    /// The provider must not keep the target alive; callbacks arriving after
    /// the target is dropped are discarded.
    fn configure(
        &self,
        buffer: BufferConfig,
        callbacks: Weak<dyn TraceCallbacks>,
    ) -> Result<(), ProviderError>;

    /// Start delivering code-object and dispatch events
    fn start_tracing(&self) -> Result<(), ProviderError>;

    /// Synchronously deliver whatever is buffered through
    /// [`TraceCallbacks::on_buffer_full`]. An empty buffer is a no-op.
    fn flush_buffer(&self) -> Result<(), ProviderError>;
}

/// Notifications the provider delivers on its callback thread(s)
pub trait TraceCallbacks: Send + Sync {
    /// A kernel symbol was registered
    fn on_code_object_load(&self, kernel_id: KernelId, mangled_name: &str);

    /// A kernel symbol is about to be unregistered
    fn on_code_object_unload(&self, kernel_id: KernelId) -> Result<(), TraceError>;

    /// The trace buffer reached its watermark, or a flush was requested.
    /// Must not return before the records are consumed.
    fn on_buffer_full(&self, records: &[DispatchRecord]) -> Result<(), TraceError>;
}
