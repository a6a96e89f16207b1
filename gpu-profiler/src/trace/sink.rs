//! Flush sinks
//!
//! A sink accepts one serialized batch at a time. Delivery is best effort:
//! the tracer counts and logs failures but never retries them.

use crate::config::TraceConfig;
use crate::error::SinkError;
use async_trait::async_trait;
use bytes::Bytes;
use hyper::client::HttpConnector;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Client, Request, Uri};
use std::time::Duration;

/// Destination for serialized trace batches
#[async_trait]
pub trait FlushSink: Send + Sync {
    /// Deliver one batch of newline-separated CSV rows
    async fn send(&self, payload: Bytes) -> Result<(), SinkError>;
}

/// Posts batches as `text/plain` to an HTTP endpoint
pub struct HttpSink {
    client: Client<HttpConnector>,
    uri: Uri,
    timeout: Duration,
}

impl HttpSink {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, SinkError> {
        let uri: Uri = endpoint
            .parse()
            .map_err(|e| SinkError::InvalidRequest(format!("endpoint {:?}: {}", endpoint, e)))?;
        if uri.scheme_str() != Some("http") {
            return Err(SinkError::InvalidRequest(format!(
                "endpoint {:?} must be an http:// URL",
                endpoint
            )));
        }

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        let client = Client::builder().build(connector);

        Ok(Self {
            client,
            uri,
            timeout,
        })
    }

    pub fn from_config(config: &TraceConfig) -> Result<Self, SinkError> {
        Self::new(&config.endpoint, config.request_timeout)
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }
}

#[async_trait]
impl FlushSink for HttpSink {
    async fn send(&self, payload: Bytes) -> Result<(), SinkError> {
        let request = Request::post(self.uri.clone())
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from(payload))
            .map_err(|e| SinkError::InvalidRequest(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| SinkError::Timeout(self.timeout))?
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        // Drain the body so the pooled connection can be reused.
        let _ = hyper::body::to_bytes(response.into_body()).await;

        if status.is_success() {
            Ok(())
        } else {
            Err(SinkError::Status(status.as_u16()))
        }
    }
}

impl std::fmt::Debug for HttpSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSink")
            .field("uri", &self.uri)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_endpoints() {
        assert!(HttpSink::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpSink::new("https://example.com/x", Duration::from_secs(1)).is_err());
        assert!(HttpSink::new("http://localhost:8001/kernel_trace", Duration::from_secs(1)).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let sink = HttpSink::new("http://127.0.0.1:9/kernel_trace", Duration::from_secs(2)).unwrap();
        let err = sink.send(Bytes::from_static(b"0,\"k\",1,2\n")).await.unwrap_err();
        assert!(
            matches!(err, SinkError::Transport(_) | SinkError::Timeout(_)),
            "unexpected error: {}",
            err
        );
    }
}
