//! HTTP surface of the aggregator

pub mod http;

use crate::ingest::KernelTraceStore;
use std::sync::Arc;

/// State shared by every request handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Arc<KernelTraceStore>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(store: Arc<KernelTraceStore>, max_body_bytes: usize) -> Self {
        Self {
            store,
            max_body_bytes,
        }
    }
}
