//! Inbound request handling.
//!
//! # Responsibilities
//! - Read the request ID assigned by the request-id layer
//! - Buffer the body under the configured size limit
//! - Convert axum request parts into an [`InboundRequest`]
//!
//! # Design Decisions
//! - Body is fully buffered before the pipeline runs; validation may reject
//!   the request before anything is sent upstream

use axum::body::{Body, Bytes};
use axum::http::{request::Parts, HeaderMap, HeaderName};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::pipeline::InboundRequest;

/// Header name for request ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// The request ID set upstream of the handler, or a fresh one.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Buffer the body, failing once it exceeds `limit` bytes.
pub async fn read_body(body: Body, limit: usize) -> Result<Bytes, GatewayError> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        tracing::warn!(limit, error = %e, "Rejected request body");
        GatewayError::PayloadTooLarge(limit)
    })
}

pub fn inbound_from_parts(parts: Parts, body: Bytes) -> InboundRequest {
    InboundRequest {
        method: parts.method,
        uri: parts.uri,
        version: parts.version,
        headers: parts.headers,
        body,
    }
}
