//! Kernel trace ingestion
//!
//! Accepts CSV batches posted by kernel tracers and keeps running per-kernel
//! statistics keyed by `(card, kernel name)`. A batch is parsed in full before
//! anything is recorded, so a malformed batch leaves no partial state behind.

use crate::metrics;
use lumen_shared::utils::time::system_time_secs;
use lumen_shared::{parse_batch, NodeId, TraceLineError};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use thiserror::Error;

/// Why a batch was rejected
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: TraceLineError,
    },

    #[error("kernel statistics unavailable: {0}")]
    Poisoned(String),
}

impl IngestError {
    /// Whether the sender is at fault
    pub fn is_client_error(&self) -> bool {
        !matches!(self, IngestError::Poisoned(_))
    }
}

/// Running statistics for one kernel on one card
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KernelStats {
    pub dispatches: u64,
    pub total_duration_ns: u64,
    pub max_duration_ns: u64,
}

impl KernelStats {
    fn record(&mut self, duration_ns: u64) {
        self.dispatches += 1;
        self.total_duration_ns = self.total_duration_ns.saturating_add(duration_ns);
        self.max_duration_ns = self.max_duration_ns.max(duration_ns);
    }

    pub fn mean_duration_ns(&self) -> u64 {
        self.total_duration_ns
            .checked_div(self.dispatches)
            .unwrap_or_default()
    }
}

/// One row of [`KernelTraceStore::snapshot`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelSummary {
    pub card: NodeId,
    pub kernel: String,
    #[serde(flatten)]
    pub stats: KernelStats,
}

/// What one accepted batch contributed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    pub events: usize,
    pub kernels: usize,
}

/// Totals across every accepted batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestTotals {
    pub batches: u64,
    pub events: u64,
    /// Unix seconds of the last accepted batch
    pub last_ingest_secs: Option<u64>,
}

/// Per-kernel dispatch statistics. Thread-safe.
#[derive(Debug, Default)]
pub struct KernelTraceStore {
    kernels: RwLock<HashMap<(NodeId, String), KernelStats>>,
    batches: AtomicU64,
    events: AtomicU64,
    last_ingest_secs: AtomicU64,
}

impl KernelTraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one posted batch and fold it into the statistics
    pub fn ingest(&self, payload: &[u8]) -> Result<IngestReceipt, IngestError> {
        let text = std::str::from_utf8(payload).map_err(|_| IngestError::NotUtf8)?;
        let events = parse_batch(text).map_err(|(line, source)| IngestError::Malformed { line, source })?;

        let mut distinct = HashSet::new();
        {
            let mut kernels = self
                .kernels
                .write()
                .map_err(|e| IngestError::Poisoned(e.to_string()))?;

            for event in &events {
                let duration_ns = event.duration_ns();
                kernels
                    .entry((event.node_id, event.kernel_name.clone()))
                    .or_default()
                    .record(duration_ns);

                let card = event.node_id.to_string();
                let labels = [card.as_str(), event.kernel_name.as_str()];
                metrics::KERNEL_DISPATCH_COUNT.with_label_values(&labels).inc();
                metrics::KERNEL_TOTAL_DURATION_NS
                    .with_label_values(&labels)
                    .inc_by(duration_ns as f64);

                distinct.insert((event.node_id, event.kernel_name.as_str()));
            }
        }

        self.batches.fetch_add(1, Ordering::Relaxed);
        self.events.fetch_add(events.len() as u64, Ordering::Relaxed);
        let now = system_time_secs();
        self.last_ingest_secs.store(now, Ordering::Relaxed);
        metrics::LAST_INGEST_TIMESTAMP.set(now as f64);

        Ok(IngestReceipt {
            events: events.len(),
            kernels: distinct.len(),
        })
    }

    /// Statistics for one kernel
    pub fn get(&self, card: NodeId, kernel: &str) -> Result<Option<KernelStats>, IngestError> {
        let kernels = self
            .kernels
            .read()
            .map_err(|e| IngestError::Poisoned(e.to_string()))?;
        Ok(kernels.get(&(card, kernel.to_string())).copied())
    }

    /// Every kernel seen so far, sorted by card then name
    pub fn snapshot(&self) -> Result<Vec<KernelSummary>, IngestError> {
        let kernels = self
            .kernels
            .read()
            .map_err(|e| IngestError::Poisoned(e.to_string()))?;

        let mut rows: Vec<KernelSummary> = kernels
            .iter()
            .map(|((card, kernel), stats)| KernelSummary {
                card: *card,
                kernel: kernel.clone(),
                stats: *stats,
            })
            .collect();
        rows.sort_by(|a, b| a.card.cmp(&b.card).then_with(|| a.kernel.cmp(&b.kernel)));
        Ok(rows)
    }

    pub fn totals(&self) -> IngestTotals {
        let last = self.last_ingest_secs.load(Ordering::Relaxed);
        IngestTotals {
            batches: self.batches.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            last_ingest_secs: (last > 0).then_some(last),
        }
    }
}
