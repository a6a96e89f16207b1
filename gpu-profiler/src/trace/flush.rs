//! Flush worker
//!
//! Both flush triggers (buffer threshold on the provider's callback thread and
//! the periodic timer) submit fully serialized batches to a single worker task
//! that owns the sink. The worker handles one request at a time, so sink calls
//! never overlap and every `send` carries exactly one batch.

use super::sink::FlushSink;
use super::stats::{FlushClock, FlushStats};
use crate::error::TraceError;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Pending batches the worker will queue before submitters block
const FLUSH_QUEUE_DEPTH: usize = 4;

/// One serialized batch awaiting delivery
#[derive(Debug)]
pub struct FlushRequest {
    pub payload: Bytes,
    pub records: usize,
    reply: oneshot::Sender<FlushOutcome>,
}

/// Result of one flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    pub records: usize,
    pub delivered: bool,
}

/// Submission side of the worker, usable from any non-async thread
#[derive(Debug, Clone)]
pub struct FlushHandle {
    tx: mpsc::Sender<FlushRequest>,
    stats: Arc<FlushStats>,
}

impl FlushHandle {
    /// Submit a batch and block until the sink call finished.
    ///
    /// Must not be called from inside an async context. A batch submitted
    /// after the worker stopped is counted as a failed flush.
    pub fn flush_blocking(&self, payload: Bytes, records: usize) -> Result<FlushOutcome, TraceError> {
        let (reply, outcome) = oneshot::channel();
        let request = FlushRequest {
            payload,
            records,
            reply,
        };

        if self.tx.blocking_send(request).is_err() {
            self.stats.record(records as u64, true);
            return Err(TraceError::FlusherClosed);
        }
        outcome.blocking_recv().map_err(|_| TraceError::FlusherClosed)
    }

    /// Account for records that were dropped before reaching the sink
    pub fn discard(&self, records: usize) {
        self.stats.discard(records as u64);
        crate::metrics::TRACE_RECORDS_TOTAL
            .with_label_values(&["rejected"])
            .inc_by(records as f64);
    }
}

/// Owns the sink and serializes every delivery
pub struct FlushWorker {
    rx: mpsc::Receiver<FlushRequest>,
    sink: Box<dyn FlushSink>,
    stats: Arc<FlushStats>,
    clock: Arc<FlushClock>,
    cancel: CancellationToken,
}

impl FlushWorker {
    pub fn new(
        sink: Box<dyn FlushSink>,
        stats: Arc<FlushStats>,
        clock: Arc<FlushClock>,
        cancel: CancellationToken,
    ) -> (Self, FlushHandle) {
        let (tx, rx) = mpsc::channel(FLUSH_QUEUE_DEPTH);
        let handle = FlushHandle {
            tx,
            stats: stats.clone(),
        };
        let worker = Self {
            rx,
            sink,
            stats,
            clock,
            cancel,
        };
        (worker, handle)
    }

    /// Serve requests until cancelled, then deliver whatever is still queued
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                request = self.rx.recv() => match request {
                    Some(request) => self.deliver(request).await,
                    None => break,
                },
            }
        }

        self.rx.close();
        while let Some(request) = self.rx.recv().await {
            self.deliver(request).await;
        }
        debug!("flush worker stopped");
    }

    async fn deliver(&self, request: FlushRequest) {
        self.clock.mark();
        let start = Instant::now();
        let result = self.sink.send(request.payload).await;
        let delivered = result.is_ok();

        self.stats.record(request.records as u64, !delivered);
        crate::metrics::observe_flush(request.records, delivered, start.elapsed().as_secs_f64());

        match result {
            Ok(()) => debug!(records = request.records, "flushed kernel trace batch"),
            Err(e) => warn!(
                records = request.records,
                "failed to post kernel trace data: {}", e
            ),
        }

        // The submitter may have given up waiting; the stats already count the batch.
        let _ = request.reply.send(FlushOutcome {
            records: request.records,
            delivered,
        });
    }
}
