//! Response normalization.
//!
//! # Responsibilities
//! - Hold the single envelope produced per request
//! - Render upstream successes and gateway errors into one JSON shape
//! - Strip headers that must not travel back to the client
//!
//! # Design Decisions
//! - Envelopes are immutable once built; there are no setters
//! - Body is always re-serialized JSON, so length/encoding headers are dropped

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};

use crate::error::GatewayError;

/// Hop-by-hop headers (RFC 7230 §6.1).
pub const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Returns true for connection-management headers, including any header
/// nominated by the message's own `Connection` header.
pub fn is_hop_by_hop(name: &HeaderName, headers: &HeaderMap) -> bool {
    if HOP_BY_HOP.contains(&name.as_str()) {
        return true;
    }
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case(name.as_str()))
}

/// The normalized response for one request.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl ResponseEnvelope {
    /// Wrap an upstream answer, keeping only headers that remain valid after
    /// the body is re-serialized.
    pub fn from_upstream(status: StatusCode, upstream_headers: &HeaderMap, body: Value) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in upstream_headers {
            if is_hop_by_hop(name, upstream_headers)
                || name == header::CONTENT_LENGTH
                || name == header::CONTENT_TYPE
                || name == header::CONTENT_ENCODING
            {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        Self { status, headers, body }
    }

    /// Uniform `{statusCode, message}` error body.
    pub fn from_error(err: &GatewayError) -> Self {
        let status = err.status_code();
        Self {
            status,
            headers: HeaderMap::new(),
            body: json!({
                "statusCode": status.as_u16(),
                "message": err.to_string(),
            }),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Value {
        &self.body
    }
}

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        let bytes = match serde_json::to_vec(&self.body) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response envelope");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}
