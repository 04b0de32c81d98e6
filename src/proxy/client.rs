//! Outbound HTTP exchange.
//!
//! # Responsibilities
//! - Build the upstream request from a forward descriptor
//! - Run the exchange on its own task under the upstream timeout
//! - Classify the result into one terminal [`ForwardState`]
//!
//! # Design Decisions
//! - One pooled hyper client shared by every request
//! - Responses pass through gzip decompression, so negotiation and JSON
//!   parsing always see the decoded body
//! - The spawned task owns the [`Continuation`]; even if it is cancelled or
//!   panics, the waiter receives exactly one [`Completion`]

use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::Value;
use tower::ServiceExt;
use tower_http::decompression::Decompression;

use crate::error::GatewayError;
use crate::pipeline::ForwardRequestDescriptor;
use crate::proxy::continuation::{Continuation, Resolution};
use crate::proxy::negotiation;

/// Lifecycle of one forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardState {
    Idle,
    Dispatched,
    Success,
    ContentMismatch,
    ParseError,
    TransportFailure,
}

impl ForwardState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ForwardState::Idle | ForwardState::Dispatched)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ForwardState::Idle => "idle",
            ForwardState::Dispatched => "dispatched",
            ForwardState::Success => "success",
            ForwardState::ContentMismatch => "content_mismatch",
            ForwardState::ParseError => "parse_error",
            ForwardState::TransportFailure => "transport_failure",
        }
    }
}

/// Outcome of one forward, delivered once through the continuation.
#[derive(Debug, Clone)]
pub struct Completion {
    pub state: ForwardState,
    pub elapsed: Duration,
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub raw_body: Option<Bytes>,
    pub result: Result<Value, GatewayError>,
}

impl Completion {
    fn failed(state: ForwardState, elapsed: Duration, err: GatewayError) -> Self {
        Self {
            state,
            elapsed,
            status: None,
            headers: HeaderMap::new(),
            raw_body: None,
            result: Err(err),
        }
    }

    /// Delivered when the forward task ends without resolving.
    pub fn abandoned() -> Self {
        Self::failed(
            ForwardState::Dispatched,
            Duration::ZERO,
            GatewayError::Internal("forward task ended without completing".to_string()),
        )
    }
}

/// Shared upstream client.
#[derive(Clone)]
pub struct UpstreamClient {
    inner: Decompression<Client<HttpConnector, Body>>,
    timeout: Duration,
    max_response_size: usize,
}

impl UpstreamClient {
    pub fn new(timeout: Duration, max_response_size: usize) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let inner = Decompression::new(client);
        Self {
            inner,
            timeout,
            max_response_size,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start the exchange on a new task and return the waiting side.
    pub fn dispatch(&self, request_id: &str, descriptor: &ForwardRequestDescriptor) -> Resolution<Completion> {
        let (continuation, resolution) = Continuation::new(Completion::abandoned());

        let request = match build_request(descriptor) {
            Ok(request) => request,
            Err(e) => {
                continuation.resolve(Completion::failed(ForwardState::TransportFailure, Duration::ZERO, e));
                return resolution;
            }
        };

        let client = self.clone();
        let accept = descriptor.accept.clone();
        let request_id = request_id.to_string();
        tokio::spawn(async move {
            let completion = client.exchange(&request_id, request, &accept).await;
            debug_assert!(completion.state.is_terminal());
            continuation.resolve(completion);
        });

        resolution
    }

    async fn exchange(&self, request_id: &str, request: Request<Body>, accept: &str) -> Completion {
        let started = Instant::now();
        let target = request.uri().clone();
        tracing::debug!(request_id = %request_id, upstream = %target, state = ForwardState::Dispatched.as_str(), "Forwarding");

        let call = async {
            let response = self
                .inner
                .clone()
                .oneshot(request)
                .await
                .map_err(|e| GatewayError::UpstreamTransportFailure(e.to_string()))?;
            let (parts, body) = response.into_parts();
            let bytes = axum::body::to_bytes(Body::new(body), self.max_response_size)
                .await
                .map_err(|e| GatewayError::UpstreamTransportFailure(format!("reading body: {}", e)))?;
            Ok::<_, GatewayError>((parts, bytes))
        };

        let (parts, bytes) = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => {
                tracing::warn!(request_id = %request_id, upstream = %target, error = %e, "Upstream request failed");
                return Completion::failed(ForwardState::TransportFailure, started.elapsed(), e);
            }
            Err(_) => {
                tracing::warn!(request_id = %request_id, upstream = %target, timeout = ?self.timeout, "Upstream timed out");
                return Completion::failed(
                    ForwardState::TransportFailure,
                    started.elapsed(),
                    GatewayError::UpstreamTimeout(self.timeout),
                );
            }
        };
        let elapsed = started.elapsed();

        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());

        let (state, result) = match negotiation::check_content_type(accept, content_type) {
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    accept = %accept,
                    content_type = content_type.unwrap_or(""),
                    body = %String::from_utf8_lossy(&bytes),
                    "Content-Type is not matched"
                );
                (ForwardState::ContentMismatch, Err(e))
            }
            Ok(()) => match negotiation::parse_body(&bytes) {
                Ok(value) => (ForwardState::Success, Ok(value)),
                Err(e) => {
                    tracing::warn!(
                        request_id = %request_id,
                        error = %e,
                        body = %String::from_utf8_lossy(&bytes),
                        "Upstream body is not valid JSON"
                    );
                    (ForwardState::ParseError, Err(e))
                }
            },
        };

        tracing::debug!(
            request_id = %request_id,
            status = parts.status.as_u16(),
            state = state.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Upstream completed"
        );

        Completion {
            state,
            elapsed,
            status: Some(parts.status),
            headers: parts.headers,
            raw_body: Some(bytes),
            result,
        }
    }
}

/// Upstream request for a descriptor: method, target and query, headers,
/// accept, and the payload with its content type.
pub fn build_request(descriptor: &ForwardRequestDescriptor) -> Result<Request<Body>, GatewayError> {
    let uri: Uri = descriptor
        .outbound_url()
        .as_str()
        .parse()
        .map_err(|e| GatewayError::Internal(format!("invalid upstream uri: {}", e)))?;

    let mut builder = Request::builder().method(descriptor.method.clone()).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in &descriptor.headers {
            headers.append(name.clone(), value.clone());
        }
        if let Ok(accept) = HeaderValue::from_str(&descriptor.accept) {
            headers.insert(header::ACCEPT, accept);
        }
    }

    let body = match &descriptor.payload {
        Some(payload) => {
            let content_type = HeaderValue::from_str(&payload.content_type)
                .map_err(|e| GatewayError::Internal(format!("invalid content type: {}", e)))?;
            if let Some(headers) = builder.headers_mut() {
                headers.insert(header::CONTENT_TYPE, content_type);
            }
            Body::from(payload.bytes.clone())
        }
        None => Body::empty(),
    };

    builder
        .body(body)
        .map_err(|e| GatewayError::Internal(format!("building upstream request: {}", e)))
}
