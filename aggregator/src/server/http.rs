//! HTTP server: kernel trace ingestion, kernel summary, health and metrics

use super::AppState;
use crate::audit;
use crate::ingest::{IngestTotals, KernelSummary};
use crate::metrics;
use hyper::body::HttpBody;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Bind the server without starting it.
///
/// Returns the bound address (useful with port 0) and the future that serves
/// until `shutdown` resolves. Must be called from within a tokio runtime.
pub fn bind(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = Result<(), hyper::Error>>), hyper::Error> {
    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let state = state.clone();
                async move { handle(req, &state).await }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    let local_addr = server.local_addr();
    tracing::info!("HTTP server listening on {}", local_addr);
    Ok((local_addr, server.with_graceful_shutdown(shutdown)))
}

async fn handle(req: Request<Body>, state: &AppState) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = match (&method, path.as_str()) {
        (&Method::POST, "/kernel_trace") => return Ok(kernel_trace(req, state).await),
        (&Method::GET, "/kernels") => kernels(state),
        (&Method::GET, "/healthz") => text(StatusCode::OK, "ok\n"),
        (&Method::GET, "/metrics") => match metrics::encode_metrics() {
            Ok(body) => {
                let mut response = text(StatusCode::OK, body);
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                response
            }
            Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, format!("{}\n", e)),
        },
        (_, "/kernel_trace" | "/kernels" | "/healthz" | "/metrics") => {
            text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n")
        }
        _ => text(StatusCode::NOT_FOUND, "not found\n"),
    };

    audit::admin_http_request(&path, response.status().as_u16());
    Ok(response)
}

enum BodyError {
    TooLarge,
    Read(hyper::Error),
}

/// Collect the request body, giving up as soon as it exceeds `limit`
async fn read_body(mut body: Body, limit: usize) -> Result<Vec<u8>, BodyError> {
    let mut payload = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(BodyError::Read)?;
        if payload.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge);
        }
        payload.extend_from_slice(&chunk);
    }
    Ok(payload)
}

async fn kernel_trace(req: Request<Body>, state: &AppState) -> Response<Body> {
    let start = Instant::now();
    let response = ingest_batch(req, state).await;
    metrics::INGEST_DURATION.observe(start.elapsed().as_secs_f64());
    response
}

async fn ingest_batch(req: Request<Body>, state: &AppState) -> Response<Body> {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.map_or(false, |len| len > state.max_body_bytes) {
        return reject(StatusCode::PAYLOAD_TOO_LARGE, "too_large", &too_large(state));
    }

    let payload = match read_body(req.into_body(), state.max_body_bytes).await {
        Ok(payload) => payload,
        Err(BodyError::TooLarge) => {
            return reject(StatusCode::PAYLOAD_TOO_LARGE, "too_large", &too_large(state))
        }
        Err(BodyError::Read(e)) => {
            return reject(StatusCode::BAD_REQUEST, "bad_request", &format!("reading body: {}", e))
        }
    };

    match state.store.ingest(&payload) {
        Ok(receipt) => {
            metrics::INGEST_REQUESTS_TOTAL.with_label_values(&["ok"]).inc();
            metrics::INGEST_EVENTS_TOTAL.inc_by(receipt.events as f64);
            debug!(
                events = receipt.events,
                kernels = receipt.kernels,
                bytes = payload.len(),
                "kernel trace batch ingested"
            );
            json(StatusCode::OK, &Status::ok())
        }
        Err(e) if e.is_client_error() => reject(StatusCode::BAD_REQUEST, "bad_request", &e.to_string()),
        Err(e) => reject(StatusCode::INTERNAL_SERVER_ERROR, "error", &e.to_string()),
    }
}

fn too_large(state: &AppState) -> String {
    format!("body exceeds {} bytes", state.max_body_bytes)
}

fn reject(status: StatusCode, label: &str, reason: &str) -> Response<Body> {
    metrics::INGEST_REQUESTS_TOTAL.with_label_values(&[label]).inc();
    audit::kernel_trace_rejected(status.as_u16(), reason);
    json(status, &Status::error(reason))
}

#[derive(Serialize)]
struct Status<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl<'a> Status<'a> {
    fn ok() -> Self {
        Self {
            status: "ok",
            error: None,
        }
    }

    fn error(reason: &'a str) -> Self {
        Self {
            status: "error",
            error: Some(reason),
        }
    }
}

#[derive(Serialize)]
struct KernelReport {
    totals: IngestTotals,
    kernels: Vec<KernelSummary>,
}

fn kernels(state: &AppState) -> Response<Body> {
    match state.store.snapshot() {
        Ok(kernels) => json(
            StatusCode::OK,
            &KernelReport {
                totals: state.store.totals(),
                kernels,
            },
        ),
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, format!("{}\n", e)),
    }
}

fn text(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, format!("{}\n", e)),
    }
}
