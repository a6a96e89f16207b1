//! Error types for sampling, tracing and flushing

use lumen_shared::{AgentId, KernelId};
use thiserror::Error;

/// Failure reported by the telemetry provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Provider or hardware not available
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The trace buffer is being flushed by another path
    #[error("trace buffer busy")]
    BufferBusy,

    /// Any other provider status code
    #[error("{operation} failed with status {code}: {message}")]
    Status {
        operation: &'static str,
        code: i32,
        message: String,
    },
}

impl ProviderError {
    pub fn status(operation: &'static str, code: i32, message: impl Into<String>) -> Self {
        ProviderError::Status {
            operation,
            code,
            message: message.into(),
        }
    }
}

/// Counter sampling errors
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("Unsupported counter: {0}")]
    UnsupportedCounter(String),

    #[error("no GPU agents found")]
    NoAgents,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Kernel tracing errors
#[derive(Debug, Error)]
pub enum TraceError {
    /// The provider broke its callback contract
    #[error("provider protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("dispatch record references unknown agent {0}")]
    UnknownAgent(AgentId),

    #[error("dispatch record references unknown kernel id {0}")]
    UnknownKernel(KernelId),

    #[error("flush worker is no longer running")]
    FlusherClosed,

    #[error("failed to start trace runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Sink delivery errors. Always transient from the tracer's point of view.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink returned HTTP {0}")]
    Status(u16),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("invalid counter list: {0}")]
    CounterSets(String),
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}
