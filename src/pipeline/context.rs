//! Per-request state threaded through the pipeline.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri, Version};
use url::Url;

use crate::apps::AppInfo;
use crate::http::response::ResponseEnvelope;

/// The inbound request, fully buffered.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Host from the `Host` header, falling back to the URI authority.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| self.uri.host())
    }

    /// Decoded query parameters in their original order; repeats are kept.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

/// Request body and its media type; one never travels without the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub content_type: String,
    pub bytes: Bytes,
}

/// Canonical description of the request sent to the backend, plus what came back.
#[derive(Debug, Clone)]
pub struct ForwardRequestDescriptor {
    pub method: Method,
    pub target: Url,
    pub protocol: Version,
    pub accept: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub payload: Option<Payload>,

    pub response_status: Option<StatusCode>,
    pub response_headers: HeaderMap,
    pub response_body: Option<Bytes>,
    pub elapsed: Option<Duration>,
}

impl ForwardRequestDescriptor {
    pub fn new(method: Method, target: Url, protocol: Version, accept: String) -> Self {
        Self {
            method,
            target,
            protocol,
            accept,
            headers: HeaderMap::new(),
            query: Vec::new(),
            payload: None,
            response_status: None,
            response_headers: HeaderMap::new(),
            response_body: None,
            elapsed: None,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.payload.as_ref().map(|p| p.content_type.as_str())
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.payload.as_ref().map(|p| &p.bytes)
    }

    /// Target URI with the query parameters appended.
    pub fn outbound_url(&self) -> Url {
        let mut url = self.target.clone();
        if !self.query.is_empty() {
            url.query_pairs_mut()
                .clear()
                .extend_pairs(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        url
    }
}

/// Everything one pipeline run knows about its request.
#[derive(Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub inbound: InboundRequest,
    /// Name of the matched route, once Prepare has run.
    pub route: Option<String>,
    pub descriptor: Option<ForwardRequestDescriptor>,
    pub app: Option<Arc<AppInfo>>,
    /// Set by the stage that produced the final answer.
    pub response: Option<ResponseEnvelope>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, inbound: InboundRequest) -> Self {
        Self {
            request_id: request_id.into(),
            inbound,
            route: None,
            descriptor: None,
            app: None,
            response: None,
        }
    }
}
