//! First stage: resolve the route and build the forward descriptor.
//!
//! Headers, query parameters and the body are copied verbatim. Hop-by-hop
//! headers are dropped when configured. A few headers never travel:
//! `Host` and `Content-Length` belong to the upstream connection,
//! `Content-Type` goes out only with a payload, and `Accept-Encoding` is
//! negotiated by the upstream client, which decodes what it asks for.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderName, Method};

use crate::config::ProxyConfig;
use crate::error::GatewayError;
use crate::http::response::is_hop_by_hop;
use crate::pipeline::context::{ForwardRequestDescriptor, InboundRequest, Payload};
use crate::pipeline::{RequestContext, Stage, StageOutcome};
use crate::routing::RouteTable;

pub struct PrepareStage {
    routes: Arc<ArcSwap<RouteTable>>,
    strip_hop_by_hop: bool,
    default_accept: String,
}

impl PrepareStage {
    pub fn new(routes: Arc<ArcSwap<RouteTable>>, proxy: &ProxyConfig) -> Self {
        Self {
            routes,
            strip_hop_by_hop: proxy.strip_hop_by_hop,
            default_accept: proxy.default_accept.clone(),
        }
    }

    fn forwarded_headers(&self, inbound: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(inbound.len());
        for (name, value) in inbound {
            if is_connection_bound(name) {
                continue;
            }
            if self.strip_hop_by_hop && is_hop_by_hop(name, inbound) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        headers
    }

    fn accept(&self, inbound: &HeaderMap) -> String {
        inbound
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.default_accept)
            .to_string()
    }
}

fn is_connection_bound(name: &HeaderName) -> bool {
    name == header::HOST
        || name == header::CONTENT_LENGTH
        || name == header::CONTENT_TYPE
        || name == header::ACCEPT_ENCODING
}

/// Body travels only for methods that carry one, and only with a media type.
fn payload(inbound: &InboundRequest) -> Option<Payload> {
    let carries_body = matches!(
        inbound.method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    if !carries_body {
        return None;
    }

    let content_type = inbound
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())?;

    Some(Payload {
        content_type: content_type.to_string(),
        bytes: inbound.body.clone(),
    })
}

#[async_trait]
impl Stage for PrepareStage {
    fn name(&self) -> &'static str {
        "prepare"
    }

    async fn pre_handle(&self, ctx: &mut RequestContext) -> StageOutcome {
        let inbound = &ctx.inbound;

        let Some(resolved) = self.routes.load().resolve(inbound) else {
            return StageOutcome::Halt(GatewayError::RouteNotFound(inbound.path().to_string()));
        };

        let mut descriptor = ForwardRequestDescriptor::new(
            inbound.method.clone(),
            resolved.target,
            inbound.version,
            self.accept(&inbound.headers),
        );
        descriptor.headers = self.forwarded_headers(&inbound.headers);
        descriptor.query = inbound.query_pairs();
        descriptor.payload = payload(inbound);

        tracing::debug!(
            request_id = %ctx.request_id,
            route = %resolved.name,
            upstream = %descriptor.target,
            "Route resolved"
        );

        ctx.route = Some(resolved.name);
        ctx.descriptor = Some(descriptor);
        StageOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use axum::body::Bytes;
    use axum::http::{HeaderValue, Version};

    fn stage(strip: bool) -> PrepareStage {
        let table = RouteTable::from_config(&[RouteConfig {
            name: "users".into(),
            host: None,
            path_prefix: "/users".into(),
            upstream: "http://backend:3000".into(),
            strip_prefix: false,
            priority: 0,
        }]);
        let proxy = ProxyConfig {
            strip_hop_by_hop: strip,
            ..ProxyConfig::default()
        };
        PrepareStage::new(Arc::new(ArcSwap::from_pointee(table)), &proxy)
    }

    fn ctx(method: Method, uri: &str, headers: &[(&'static str, &'static str)], body: &'static str) -> RequestContext {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.append(*k, HeaderValue::from_static(*v));
        }
        RequestContext::new(
            "req",
            InboundRequest {
                method,
                uri: uri.parse().unwrap(),
                version: Version::HTTP_11,
                headers: map,
                body: Bytes::from_static(body.as_bytes()),
            },
        )
    }

    #[tokio::test]
    async fn test_builds_descriptor() {
        let mut ctx = ctx(
            Method::POST,
            "/users/7?q=a%20b&q=c",
            &[
                ("host", "gateway"),
                ("content-type", "application/json"),
                ("content-length", "9"),
                ("x-trace", "abc"),
                ("accept", "application/json"),
            ],
            r#"{"a":1}"#,
        );

        assert!(matches!(stage(true).pre_handle(&mut ctx).await, StageOutcome::Continue));

        let desc = ctx.descriptor.as_ref().unwrap();
        assert_eq!(ctx.route.as_deref(), Some("users"));
        assert_eq!(desc.target.as_str(), "http://backend:3000/users/7");
        assert_eq!(desc.query, vec![("q".into(), "a b".into()), ("q".into(), "c".into())]);
        assert_eq!(desc.content_type(), Some("application/json"));
        assert_eq!(desc.body().unwrap().as_ref(), br#"{"a":1}"#);
        assert_eq!(desc.headers.get("x-trace").unwrap(), "abc");
        assert!(desc.headers.get("host").is_none());
        assert!(desc.headers.get("content-length").is_none());
        assert!(desc.headers.get("content-type").is_none());
    }

    #[tokio::test]
    async fn test_no_route() {
        let mut ctx = ctx(Method::GET, "/orders", &[], "");
        match stage(true).pre_handle(&mut ctx).await {
            StageOutcome::Halt(GatewayError::RouteNotFound(path)) => assert_eq!(path, "/orders"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(ctx.descriptor.is_none());
    }

    #[tokio::test]
    async fn test_body_needs_content_type_and_method() {
        let mut no_type = ctx(Method::POST, "/users", &[], "raw");
        stage(true).pre_handle(&mut no_type).await;
        assert!(no_type.descriptor.unwrap().payload.is_none());

        let mut get = ctx(Method::GET, "/users", &[("content-type", "application/json")], "{}");
        stage(true).pre_handle(&mut get).await;
        let desc = get.descriptor.unwrap();
        assert!(desc.payload.is_none());
        assert!(desc.content_type().is_none());
        assert!(desc.headers.get("content-type").is_none());
    }

    #[tokio::test]
    async fn test_accept_encoding_not_forwarded() {
        let mut c = ctx(
            Method::GET,
            "/users",
            &[("accept-encoding", "gzip, br"), ("x-trace", "abc")],
            "",
        );
        stage(false).pre_handle(&mut c).await;
        let desc = c.descriptor.unwrap();
        assert!(desc.headers.get("accept-encoding").is_none());
        assert_eq!(desc.headers.get("x-trace").unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_accept_default_and_hop_by_hop() {
        let headers = [("connection", "x-private"), ("x-private", "1"), ("te", "trailers")];

        let mut stripped = ctx(Method::GET, "/users", &headers, "");
        stage(true).pre_handle(&mut stripped).await;
        let desc = stripped.descriptor.unwrap();
        assert_eq!(desc.accept, "application/json");
        assert!(desc.headers.is_empty());

        let mut kept = ctx(Method::GET, "/users", &headers, "");
        stage(false).pre_handle(&mut kept).await;
        assert_eq!(kept.descriptor.unwrap().headers.len(), 3);
    }
}
