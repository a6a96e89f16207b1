//! Kernel dispatch tracer
//!
//! Registers with the provider as its [`TraceCallbacks`] target and turns
//! dispatch records into CSV batches for the flush worker. Batches leave the
//! tracer on two paths:
//!
//! - **threshold**: the provider's buffer reaches its watermark and it calls
//!   [`TraceCallbacks::on_buffer_full`] on its callback thread. The batch is
//!   serialized and delivered before the callback returns, since the provider
//!   reuses the record memory afterwards.
//! - **periodic**: a timer task wakes every flush interval and, if no flush
//!   happened for at least one interval, asks the provider to flush, which
//!   re-enters the threshold path.
//!
//! Kernel names are resolved at serialization time, and a kernel unload
//! flushes the buffer before the name is dropped, so every buffered record
//! still finds its kernel in the symbol table.

use super::flush::{FlushHandle, FlushWorker};
use super::sink::FlushSink;
use super::stats::{FlushClock, FlushStats, FlushSummary};
use super::symbols::KernelSymbolTable;
use crate::config::TraceConfig;
use crate::error::{ProviderError, TraceError};
use crate::provider::{TraceCallbacks, TraceProvider};
use bytes::Bytes;
use lumen_shared::{write_line, AgentId, DispatchRecord, KernelId, NodeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Serialized bytes reserved per record up front. Demangled template kernels
/// can run to several hundred bytes, most are far shorter.
const LINE_SIZE_HINT: usize = 256;

/// Attempts to get the provider's buffer out before a kernel name is dropped
const DRAIN_ATTEMPTS: u32 = 40;
const DRAIN_BACKOFF_START: Duration = Duration::from_millis(1);
const DRAIN_BACKOFF_MAX: Duration = Duration::from_millis(50);

/// Lifecycle of a tracer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracerState {
    Running,
    Stopping,
    Stopped,
}

/// State reachable from provider callbacks and the periodic task
struct TracerShared {
    provider: Arc<dyn TraceProvider>,
    agents: HashMap<AgentId, NodeId>,
    symbols: KernelSymbolTable,
    flusher: FlushHandle,
}

impl TracerShared {
    /// Serialize every record whose agent and kernel resolve. Records that
    /// do not resolve are counted and skipped, the first lookup failure is
    /// kept for the caller.
    fn serialize(&self, records: &[DispatchRecord]) -> SerializedBatch {
        let mut batch = SerializedBatch {
            payload: String::with_capacity(records.len() * LINE_SIZE_HINT),
            records: 0,
            rejected: 0,
            error: None,
        };
        self.symbols.with_names(|names| {
            for record in records {
                let resolved = self
                    .agents
                    .get(&record.agent)
                    .ok_or(TraceError::UnknownAgent(record.agent))
                    .and_then(|node_id| {
                        names
                            .get(&record.kernel_id)
                            .map(|name| (*node_id, name))
                            .ok_or(TraceError::UnknownKernel(record.kernel_id))
                    });
                match resolved {
                    Ok((node_id, kernel_name)) => {
                        write_line(
                            &mut batch.payload,
                            node_id,
                            kernel_name,
                            record.start_timestamp,
                            record.end_timestamp,
                        );
                        batch.records += 1;
                    }
                    Err(e) => {
                        batch.rejected += 1;
                        batch.error.get_or_insert(e);
                    }
                }
            }
        });
        batch
    }

    /// Ask the provider to deliver its buffer; "busy" means another flush is
    /// already in progress and is not an error
    fn request_flush(&self) -> Result<(), ProviderError> {
        match self.provider.flush_buffer() {
            Err(ProviderError::BufferBusy) => {
                debug!("trace buffer busy, skipping flush");
                Ok(())
            }
            other => other,
        }
    }

    /// Flush that must reach the provider's buffer. A concurrent flush may
    /// hold it, so "busy" is retried with a capped backoff before giving up.
    fn drain_buffer(&self) -> Result<(), ProviderError> {
        let mut backoff = DRAIN_BACKOFF_START;
        for attempt in 1..=DRAIN_ATTEMPTS {
            match self.provider.flush_buffer() {
                Err(ProviderError::BufferBusy) => {
                    debug!(attempt, "trace buffer busy, retrying drain");
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(DRAIN_BACKOFF_MAX);
                }
                other => return other,
            }
        }
        Err(ProviderError::BufferBusy)
    }
}

/// Outcome of serializing one provider batch
struct SerializedBatch {
    payload: String,
    records: usize,
    rejected: usize,
    error: Option<TraceError>,
}

impl TraceCallbacks for TracerShared {
    fn on_code_object_load(&self, kernel_id: KernelId, mangled_name: &str) {
        self.symbols.insert(kernel_id, mangled_name);
    }

    fn on_code_object_unload(&self, kernel_id: KernelId) -> Result<(), TraceError> {
        // Buffered records may still reference this kernel; keep the name
        // until they are out.
        if let Err(e) = self.drain_buffer() {
            warn!(kernel_id, "cannot drain trace buffer before unload: {}", e);
            return Err(e.into());
        }
        self.symbols.remove(kernel_id);
        debug!(kernel_id, "kernel symbol unregistered");
        Ok(())
    }

    fn on_buffer_full(&self, records: &[DispatchRecord]) -> Result<(), TraceError> {
        if records.is_empty() {
            error!("provider invoked the buffer callback with no records");
            return Err(TraceError::ProtocolViolation(
                "buffer callback invoked with no records".into(),
            ));
        }

        let batch = self.serialize(records);
        if batch.rejected > 0 {
            self.flusher.discard(batch.rejected);
        }
        if batch.records > 0 {
            self.flusher
                .flush_blocking(Bytes::from(batch.payload), batch.records)?;
        }

        match batch.error {
            Some(e) => {
                error!(
                    rejected = batch.rejected,
                    delivered = batch.records,
                    "dropped unresolvable kernel dispatch records: {}", e
                );
                Err(e)
            }
            None => Ok(()),
        }
    }
}

struct TracerTasks {
    periodic: JoinHandle<()>,
    worker: JoinHandle<()>,
}

/// Buffers kernel dispatch events and flushes them to a sink
pub struct KernelTracer {
    shared: Arc<TracerShared>,
    stats: Arc<FlushStats>,
    config: TraceConfig,
    periodic_cancel: CancellationToken,
    worker_cancel: CancellationToken,
    tasks: Mutex<Option<TracerTasks>>,
    state: Mutex<TracerState>,
    // Declared last so the tasks above are joined before the runtime drops.
    runtime: Runtime,
}

impl KernelTracer {
    /// Register with the provider, start tracing and the periodic flusher.
    ///
    /// Must be called (and the tracer dropped) outside of any async context:
    /// the tracer owns its own runtime. Provider errors here are fatal.
    pub fn start(
        config: TraceConfig,
        provider: Arc<dyn TraceProvider>,
        sink: Box<dyn FlushSink>,
    ) -> Result<Self, TraceError> {
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("lumen-trace")
            .enable_all()
            .build()?;

        let agents: HashMap<AgentId, NodeId> = provider
            .list_agents()?
            .into_iter()
            .map(|agent| (agent.id, agent.node_id))
            .collect();

        let stats = Arc::new(FlushStats::new());
        let clock = Arc::new(FlushClock::new());
        let worker_cancel = CancellationToken::new();
        let (worker, flusher) =
            FlushWorker::new(sink, stats.clone(), clock.clone(), worker_cancel.clone());
        let worker = runtime.spawn(worker.run());

        let shared = Arc::new(TracerShared {
            provider: provider.clone(),
            agents,
            symbols: KernelSymbolTable::new(),
            flusher,
        });

        let weak: Weak<TracerShared> = Arc::downgrade(&shared);
        let callbacks: Weak<dyn TraceCallbacks> = weak;
        provider.configure(config.buffer_config(), callbacks)?;
        provider.start_tracing()?;

        clock.mark();
        let periodic_cancel = CancellationToken::new();
        let periodic = runtime.spawn(periodic_flush(
            shared.clone(),
            clock,
            config.flush_interval,
            periodic_cancel.clone(),
        ));

        info!(
            agents = shared.agents.len(),
            flush_interval = ?config.flush_interval,
            buffer_bytes = config.buffer_size_bytes,
            endpoint = %config.endpoint,
            "kernel tracer started"
        );

        Ok(Self {
            shared,
            stats,
            config,
            periodic_cancel,
            worker_cancel,
            tasks: Mutex::new(Some(TracerTasks { periodic, worker })),
            state: Mutex::new(TracerState::Running),
            runtime,
        })
    }

    /// Ask the provider to deliver whatever is buffered now
    pub fn flush(&self) -> Result<(), ProviderError> {
        self.shared.request_flush()
    }

    /// Stop the periodic flusher, deliver what is still buffered, stop the
    /// flush worker and report the summary.
    ///
    /// Safe to call more than once; later calls only return the summary.
    pub fn shutdown(&self) -> FlushSummary {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != TracerState::Running {
                return self.stats.snapshot();
            }
            *state = TracerState::Stopping;
        }

        self.periodic_cancel.cancel();
        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(tasks) = tasks {
            if let Err(e) = self.runtime.block_on(tasks.periodic) {
                warn!("periodic flush task failed: {}", e);
            }

            if let Err(e) = self.shared.request_flush() {
                warn!("final trace buffer flush failed: {}", e);
            }

            self.worker_cancel.cancel();
            if let Err(e) = self.runtime.block_on(tasks.worker) {
                warn!("flush worker failed: {}", e);
            }
        }

        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = TracerState::Stopped;

        let summary = self.stats.snapshot();
        info!("trace summary: {}", summary);
        summary
    }

    pub fn state(&self) -> TracerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> FlushSummary {
        self.stats.snapshot()
    }

    pub fn symbols(&self) -> &KernelSymbolTable {
        &self.shared.symbols
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }
}

impl Drop for KernelTracer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for KernelTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelTracer")
            .field("state", &self.state())
            .field("stats", &self.stats())
            .field("config", &self.config)
            .finish()
    }
}

/// Timer loop. Re-checks the time since the last flush on every wake, so a
/// threshold flush in between pushes the next periodic flush back by up to
/// one interval.
async fn periodic_flush(
    shared: Arc<TracerShared>,
    clock: Arc<FlushClock>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        if clock.elapsed() < interval {
            continue;
        }

        // The provider delivers synchronously through on_buffer_full, which
        // blocks on the flush worker; keep that off the async workers.
        let target = shared.clone();
        match tokio::task::spawn_blocking(move || target.request_flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("periodic buffer flush failed: {}", e),
            Err(e) => warn!("periodic buffer flush aborted: {}", e),
        }
    }
    debug!("periodic flush task stopped");
}
