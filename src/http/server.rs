//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all gateway handler
//! - Wire up middleware (request ID, tracing)
//! - Run every request through the gateway pipeline under the request deadline
//! - Apply config reloads and stop on the shutdown signal

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::gateway::GatewayCore;
use crate::http::{request, ResponseEnvelope};
use crate::observability::metrics;
use crate::pipeline::RequestContext;
use crate::quota::{build_store, CounterStore, StoreError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub core: GatewayCore,
    pub max_body_size: usize,
    pub request_timeout: Duration,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    core: GatewayCore,
}

impl HttpServer {
    /// Create a server with the counting store named in the config.
    pub fn new(config: GatewayConfig) -> Result<Self, StoreError> {
        let store = build_store(&config.store)?;
        Ok(Self::with_store(config, store))
    }

    /// Create a server around a caller-supplied counting store.
    pub fn with_store(config: GatewayConfig, store: Arc<dyn CounterStore>) -> Self {
        let core = GatewayCore::build(&config, store);
        let state = AppState {
            core: core.clone(),
            max_body_size: config.listener.max_body_size,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        };
        let router = Self::build_router(state);
        Self { router, config, core }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Run the server until `shutdown` fires, applying any config pushed on
    /// `config_updates` in the meantime.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let core = self.core.clone();
        let reloader = tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                core.apply_config(&new_config).await;
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn core(&self) -> &GatewayCore {
        &self.core
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Catch-all handler: one pipeline run, one envelope.
///
/// The request deadline covers reading the body and the whole pipeline.
/// When it fires the pipeline future is dropped, which releases any held
/// store session, and the caller gets a `RequestTimeout` envelope.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let deadline = tokio::time::Instant::now() + state.request_timeout;
    let (parts, body) = request.into_parts();
    let method = parts.method.to_string();
    let request_id = request::request_id(&parts.headers);

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %parts.uri.path(),
        "Handling request"
    );

    let read = tokio::time::timeout_at(deadline, request::read_body(body, state.max_body_size));
    let (envelope, route) = match read.await {
        Ok(Ok(bytes)) => {
            let inbound = request::inbound_from_parts(parts, bytes);
            let mut ctx = RequestContext::new(request_id.clone(), inbound);
            let run = state.core.pipeline.run_with_context(&mut ctx);
            let envelope = match tokio::time::timeout_at(deadline, run).await {
                Ok(envelope) => envelope,
                Err(_) => timed_out(&request_id, state.request_timeout),
            };
            (envelope, ctx.route.unwrap_or_else(|| "none".to_string()))
        }
        Ok(Err(e)) => {
            metrics::record_rejection(e.kind());
            (e.into_envelope(), "none".to_string())
        }
        Err(_) => (timed_out(&request_id, state.request_timeout), "none".to_string()),
    };

    metrics::record_request(&method, envelope.status().as_u16(), &route, start_time);
    envelope.into_response()
}

fn timed_out(request_id: &str, limit: Duration) -> ResponseEnvelope {
    let err = GatewayError::RequestTimeout(limit);
    tracing::warn!(request_id = %request_id, timeout = ?limit, "Request deadline exceeded");
    metrics::record_rejection(err.kind());
    err.into_envelope()
}
