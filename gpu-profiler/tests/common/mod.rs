//! In-memory provider and sink doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use lumen_gpu::error::{ProviderError, SinkError, TraceError};
use lumen_gpu::provider::{BufferConfig, CounterProvider, TraceCallbacks, TraceProvider};
use lumen_gpu::FlushSink;
use lumen_shared::{
    Agent, AgentId, AgentKind, CounterDescriptor, CounterId, DispatchRecord, KernelId,
    ProfileHandle, RawRecord,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

pub fn cpu_agent(id: u64, node_id: u32) -> Agent {
    Agent {
        id: AgentId(id),
        node_id,
        kind: AgentKind::Cpu,
    }
}

pub fn dispatch(agent: u64, kernel_id: KernelId, start: u64, end: u64) -> DispatchRecord {
    DispatchRecord {
        agent: AgentId(agent),
        kernel_id,
        start_timestamp: start,
        end_timestamp: end,
    }
}

// ── Counter provider ─────────────────────────────────────────────────────────

/// Counter provider exposing `A` (id 10, one instance) and `B` (id 20,
/// dimensions [2, 2]) on every agent
pub struct MockCounterProvider {
    agents: Vec<Agent>,
    counters: Vec<CounterDescriptor>,
    samples: Mutex<Vec<RawRecord>>,
    next_handle: AtomicU64,
    pub profiles_created: AtomicUsize,
    pub fail_start: AtomicBool,
    pub started: Mutex<Vec<(AgentId, ProfileHandle)>>,
    pub stopped: Mutex<Vec<AgentId>>,
}

impl MockCounterProvider {
    pub fn new(agents: Vec<Agent>) -> Self {
        Self {
            agents,
            counters: vec![
                CounterDescriptor::new("A", 10, vec![]),
                CounterDescriptor::new("B", 20, vec![2, 2]),
            ],
            samples: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
            profiles_created: AtomicUsize::new(0),
            fail_start: AtomicBool::new(false),
            started: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
        }
    }

    /// Records returned by every subsequent pull
    pub fn set_samples(&self, samples: Vec<RawRecord>) {
        *self.samples.lock().unwrap() = samples;
    }

    pub fn created(&self) -> usize {
        self.profiles_created.load(Ordering::SeqCst)
    }
}

impl CounterProvider for MockCounterProvider {
    fn list_agents(&self) -> Result<Vec<Agent>, ProviderError> {
        Ok(self.agents.clone())
    }

    fn list_counters(&self, _agent: AgentId) -> Result<Vec<CounterDescriptor>, ProviderError> {
        Ok(self.counters.clone())
    }

    fn create_profile(
        &self,
        _agent: AgentId,
        _counters: &[CounterId],
    ) -> Result<ProfileHandle, ProviderError> {
        self.profiles_created.fetch_add(1, Ordering::SeqCst);
        Ok(ProfileHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)))
    }

    fn start_collection(&self, agent: AgentId, profile: ProfileHandle) -> Result<(), ProviderError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ProviderError::status("start_collection", 12, "device lost"));
        }
        self.started.lock().unwrap().push((agent, profile));
        Ok(())
    }

    fn stop_collection(&self, agent: AgentId) -> Result<(), ProviderError> {
        self.stopped.lock().unwrap().push(agent);
        Ok(())
    }

    fn pull_samples(&self, _agent: AgentId, records: &mut [RawRecord]) -> Result<usize, ProviderError> {
        let samples = self.samples.lock().unwrap();
        let written = samples.len().min(records.len());
        records[..written].copy_from_slice(&samples[..written]);
        Ok(written)
    }
}

// ── Trace provider ───────────────────────────────────────────────────────────

/// Trace provider holding a pending buffer. `flush_buffer` delivers it through
/// the registered callbacks, `fill` simulates a watermark crossing.
pub struct MockTraceProvider {
    agents: Vec<Agent>,
    callbacks: Mutex<Option<Weak<dyn TraceCallbacks>>>,
    pending: Mutex<Vec<DispatchRecord>>,
    flushing: AtomicBool,
    busy: AtomicUsize,
    pub buffer: Mutex<Option<BufferConfig>>,
    pub tracing: AtomicBool,
    pub fail_list_agents: bool,
}

impl MockTraceProvider {
    pub fn new(agents: Vec<Agent>) -> Self {
        Self {
            agents,
            callbacks: Mutex::new(None),
            pending: Mutex::new(Vec::new()),
            flushing: AtomicBool::new(false),
            busy: AtomicUsize::new(0),
            buffer: Mutex::new(None),
            tracing: AtomicBool::new(false),
            fail_list_agents: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            fail_list_agents: true,
            ..Self::new(Vec::new())
        }
    }

    fn callbacks(&self) -> Option<Arc<dyn TraceCallbacks>> {
        self.callbacks.lock().unwrap().as_ref().and_then(Weak::upgrade)
    }

    pub fn load(&self, kernel_id: KernelId, name: &str) {
        if let Some(callbacks) = self.callbacks() {
            callbacks.on_code_object_load(kernel_id, name);
        }
    }

    pub fn unload(&self, kernel_id: KernelId) -> Result<(), TraceError> {
        match self.callbacks() {
            Some(callbacks) => callbacks.on_code_object_unload(kernel_id),
            None => Ok(()),
        }
    }

    /// Buffer records without triggering delivery
    pub fn push(&self, records: impl IntoIterator<Item = DispatchRecord>) {
        self.pending.lock().unwrap().extend(records);
    }

    /// Report `BufferBusy` from the next `calls` flushes, as if another
    /// thread held the buffer
    pub fn set_busy(&self, calls: usize) {
        self.busy.store(calls, Ordering::SeqCst);
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Deliver `records` as a watermark crossing on the calling thread
    pub fn fill(&self, records: &[DispatchRecord]) -> Result<(), TraceError> {
        match self.callbacks() {
            Some(callbacks) => callbacks.on_buffer_full(records),
            None => Ok(()),
        }
    }
}

impl TraceProvider for MockTraceProvider {
    fn list_agents(&self) -> Result<Vec<Agent>, ProviderError> {
        if self.fail_list_agents {
            return Err(ProviderError::Unavailable("no devices".into()));
        }
        Ok(self.agents.clone())
    }

    fn configure(
        &self,
        buffer: BufferConfig,
        callbacks: Weak<dyn TraceCallbacks>,
    ) -> Result<(), ProviderError> {
        *self.buffer.lock().unwrap() = Some(buffer);
        *self.callbacks.lock().unwrap() = Some(callbacks);
        Ok(())
    }

    fn start_tracing(&self) -> Result<(), ProviderError> {
        self.tracing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn flush_buffer(&self) -> Result<(), ProviderError> {
        let held = self
            .busy
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if held || self.flushing.swap(true, Ordering::SeqCst) {
            return Err(ProviderError::BufferBusy);
        }

        let records = std::mem::take(&mut *self.pending.lock().unwrap());
        let result = match self.callbacks() {
            Some(callbacks) if !records.is_empty() => callbacks
                .on_buffer_full(&records)
                .map_err(|e| ProviderError::status("flush_buffer", -1, e.to_string())),
            _ => Ok(()),
        };

        self.flushing.store(false, Ordering::SeqCst);
        result
    }
}

// ── Sinks ────────────────────────────────────────────────────────────────────

/// Sink keeping every batch it receives. Clones share state, so a test keeps
/// one clone and hands the other to the tracer.
#[derive(Clone, Default)]
pub struct RecordingSink {
    batches: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    overlaps: Arc<AtomicUsize>,
    delay: Duration,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every send for `delay` to widen race windows
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Reject every batch with HTTP 503
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<String> {
        self.batches.lock().unwrap().clone()
    }

    pub fn lines(&self) -> usize {
        self.batches().iter().map(|b| b.lines().count()).sum()
    }

    /// Sends that started while another was still running
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlushSink for RecordingSink {
    async fn send(&self, payload: Bytes) -> Result<(), SinkError> {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.batches
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&payload).into_owned());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            Err(SinkError::Status(503))
        } else {
            Ok(())
        }
    }
}
