//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Find the route for a request and resolve its upstream target URL
//!
//! # Design Decisions
//! - Immutable after construction; reloads build a new table
//! - Higher priority first, then longer prefix
//! - Explicit `None` rather than a silent default route

use url::Url;

use crate::config::RouteConfig;
use crate::pipeline::InboundRequest;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    prefix: String,
    upstream: Url,
    strip_prefix: bool,
    priority: u32,
    matcher: AndMatcher,
}

impl Route {
    fn compile(config: &RouteConfig) -> Result<Self, url::ParseError> {
        let upstream = Url::parse(&config.upstream)?;

        let mut matchers: Vec<Box<dyn Matcher>> =
            vec![Box::new(PathPrefixMatcher::new(config.path_prefix.clone()))];
        if let Some(host) = &config.host {
            matchers.push(Box::new(HostMatcher::new(host.clone())));
        }

        Ok(Self {
            name: config.name.clone(),
            prefix: config.path_prefix.clone(),
            upstream,
            strip_prefix: config.strip_prefix,
            priority: config.priority,
            matcher: AndMatcher::new(matchers),
        })
    }

    /// Upstream URL for an inbound path. Query is left empty.
    pub fn target_for(&self, path: &str) -> Url {
        let remainder = if self.strip_prefix {
            let rest = path.strip_prefix(self.prefix.as_str()).unwrap_or(path);
            if rest.is_empty() || rest.starts_with('/') {
                rest.to_string()
            } else {
                format!("/{}", rest)
            }
        } else {
            path.to_string()
        };

        let mut target = self.upstream.clone();
        let base = target.path().trim_end_matches('/').to_string();
        target.set_path(&format!("{}{}", base, remainder));
        target.set_query(None);
        target
    }
}

/// A matched route and the URL to forward to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub name: String,
    pub target: Url,
}

/// Immutable route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Compile routes, skipping (and logging) any with an unparseable upstream.
    pub fn from_config(configs: &[RouteConfig]) -> Self {
        let mut routes: Vec<Route> = configs
            .iter()
            .filter_map(|config| match Route::compile(config) {
                Ok(route) => Some(route),
                Err(e) => {
                    tracing::warn!(route = %config.name, upstream = %config.upstream, error = %e, "Invalid route upstream");
                    None
                }
            })
            .collect();

        routes.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.prefix.len().cmp(&a.prefix.len()))
        });

        Self { routes }
    }

    pub fn resolve(&self, req: &InboundRequest) -> Option<ResolvedRoute> {
        self.routes
            .iter()
            .find(|route| route.matcher.matches(req))
            .map(|route| ResolvedRoute {
                name: route.name.clone(),
                target: route.target_for(req.path()),
            })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
