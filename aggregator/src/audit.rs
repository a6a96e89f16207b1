//! Audit logging for ingest and admin requests.
//!
//! Events go through `tracing` with a dedicated target so they can be filtered
//! and formatted separately (e.g. `RUST_LOG=lumen::audit=info`).

use tracing::{info, warn};

const AUDIT_TARGET: &str = "lumen::audit";

/// A kernel trace batch was rejected
pub fn kernel_trace_rejected(status: u16, reason: &str) {
    warn!(
        target: AUDIT_TARGET,
        event = "kernel_trace_rejected",
        status = %status,
        reason = %reason,
    );
}

/// Admin HTTP request (metrics, health, kernel summary)
pub fn admin_http_request(path: &str, status: u16) {
    info!(
        target: AUDIT_TARGET,
        event = "admin_http_request",
        path = %path,
        status = %status,
    );
}
