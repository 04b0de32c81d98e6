//! Admin API.
//!
//! Bearer-token protected, served on its own listener:
//! - `GET /admin/status`
//! - `GET /admin/cache`
//! - `DELETE /admin/cache/{app_key}`
//! - `GET /admin/store`

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::config::AdminConfig;
use crate::gateway::GatewayCore;

#[derive(Clone)]
pub struct AdminState {
    pub core: GatewayCore,
    pub api_key: String,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/cache", get(get_cache))
        .route("/admin/cache/{app_key}", delete(invalidate_cache))
        .route("/admin/store", get(get_store))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve(
    config: AdminConfig,
    core: GatewayCore,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    let router = setup_admin_router(AdminState {
        core,
        api_key: config.api_key,
    });

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
