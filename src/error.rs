//! Gateway error taxonomy.
//!
//! Every rejection a caller can observe is one of these variants. Each maps to
//! exactly one HTTP status and is rendered through [`ResponseEnvelope::from_error`]
//! into the uniform `{statusCode, message}` body.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

use crate::http::response::ResponseEnvelope;

/// Typed failures produced by pipeline stages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// No route matched the inbound path.
    #[error("no route for path {0}")]
    RouteNotFound(String),

    /// Inbound body exceeds the configured limit.
    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// Neither the key header nor the key query parameter was sent.
    #[error("appKey is required")]
    MissingCallerKey,

    /// Caller key not provisioned.
    #[error("appKey is not exist: {0}")]
    UnknownCaller(String),

    /// A judge rejected the caller.
    #[error("{judge} limit exceeded")]
    LimitExceeded { judge: &'static str },

    /// Counting store unreachable or returned garbage.
    #[error("Validation Service is exhausted: {0}")]
    ValidationServiceUnavailable(String),

    /// Backend answered with a different media type than the caller accepts.
    #[error("Content-Type is not matched: expected {expected}, got {actual}")]
    ContentTypeMismatch { expected: String, actual: String },

    /// Backend body could not be parsed.
    #[error("upstream response could not be parsed: {0}")]
    UpstreamParseFailure(String),

    /// Connection refused, reset or similar.
    #[error("upstream request failed: {0}")]
    UpstreamTransportFailure(String),

    /// Backend did not answer in time.
    #[error("upstream timed out after {}ms", .0.as_millis())]
    UpstreamTimeout(Duration),

    /// The whole request overran its deadline.
    #[error("request timed out after {}ms", .0.as_millis())]
    RequestTimeout(Duration),

    /// Anything else; never carries internal detail to the caller.
    #[error("internal server error")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status the error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::MissingCallerKey => StatusCode::BAD_REQUEST,
            GatewayError::UnknownCaller(_) => StatusCode::BAD_REQUEST,
            GatewayError::LimitExceeded { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::ValidationServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::ContentTypeMismatch { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamParseFailure(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTransportFailure(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::RequestTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound(_) => "route_not_found",
            GatewayError::PayloadTooLarge(_) => "payload_too_large",
            GatewayError::MissingCallerKey => "missing_caller_key",
            GatewayError::UnknownCaller(_) => "unknown_caller",
            GatewayError::LimitExceeded { .. } => "limit_exceeded",
            GatewayError::ValidationServiceUnavailable(_) => "validation_unavailable",
            GatewayError::ContentTypeMismatch { .. } => "content_type_mismatch",
            GatewayError::UpstreamParseFailure(_) => "upstream_parse_failure",
            GatewayError::UpstreamTransportFailure(_) => "upstream_transport_failure",
            GatewayError::UpstreamTimeout(_) => "upstream_timeout",
            GatewayError::RequestTimeout(_) => "request_timeout",
            GatewayError::Internal(_) => "internal",
        }
    }

    /// Convert into the uniform error envelope.
    pub fn into_envelope(self) -> ResponseEnvelope {
        ResponseEnvelope::from_error(&self)
    }
}

/// Result type for gateway stages.
pub type GatewayResult<T> = Result<T, GatewayError>;
