//! Configuration for the kernel tracer
//!
//! Read once at initialization; there is no hot reload.

use crate::error::ConfigError;
use crate::provider::{BufferConfig, BufferPolicy};
use lumen_shared::utils::parse_duration;
use std::time::Duration;

/// Default periodic flush interval
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Default trace buffer size in bytes
pub const DEFAULT_BUFFER_SIZE_BYTES: u64 = 262_144;

/// Default endpoint receiving kernel trace batches
pub const DEFAULT_TRACE_ENDPOINT: &str = "http://localhost:8001/kernel_trace";

/// Default connect/request timeout for the sink
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Kernel tracer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    /// Maximum time between flushes when the buffer does not fill up
    pub flush_interval: Duration,

    /// Provider trace buffer capacity in bytes
    pub buffer_size_bytes: u64,

    /// Sink URL
    pub endpoint: String,

    /// Connect and request timeout for the sink
    pub request_timeout: Duration,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            buffer_size_bytes: DEFAULT_BUFFER_SIZE_BYTES,
            endpoint: DEFAULT_TRACE_ENDPOINT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl TraceConfig {
    /// Defaults overridden by `LUMEN_TRACE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each
    /// `LUMEN_TRACE_*` key. Malformed values are errors, never defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("LUMEN_TRACE_FLUSH_INTERVAL") {
            config.flush_interval = parse_duration(&raw)
                .map_err(|e| ConfigError::invalid("LUMEN_TRACE_FLUSH_INTERVAL", e.to_string()))?;
        }
        if let Some(raw) = lookup("LUMEN_TRACE_TIMEOUT") {
            config.request_timeout = parse_duration(&raw)
                .map_err(|e| ConfigError::invalid("LUMEN_TRACE_TIMEOUT", e.to_string()))?;
        }
        if let Some(raw) = lookup("LUMEN_TRACE_BUFFER_SIZE") {
            config.buffer_size_bytes = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::invalid("LUMEN_TRACE_BUFFER_SIZE", format!("{:?}: {}", raw, e))
            })?;
        }
        if let Some(endpoint) = lookup("LUMEN_TRACE_ENDPOINT") {
            config.endpoint = endpoint;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval.is_zero() {
            return Err(ConfigError::invalid("flush_interval", "must be greater than 0"));
        }
        if self.buffer_size_bytes < 8 {
            return Err(ConfigError::invalid(
                "buffer_size_bytes",
                format!("{} is too small (min 8 bytes)", self.buffer_size_bytes),
            ));
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::invalid("endpoint", "must not be empty"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid("request_timeout", "must be greater than 0"));
        }
        Ok(())
    }

    /// Fill level at which the provider delivers the buffer. Kept at 7/8 of
    /// capacity so the lossless buffer never has to stall producers.
    pub fn watermark_bytes(&self) -> u64 {
        self.buffer_size_bytes - self.buffer_size_bytes / 8
    }

    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig {
            size_bytes: self.buffer_size_bytes,
            watermark_bytes: self.watermark_bytes(),
            policy: BufferPolicy::Lossless,
        }
    }
}
