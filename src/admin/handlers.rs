use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::quota::PoolStatus;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub stages: Vec<&'static str>,
    pub routes: usize,
    pub apps: usize,
    pub judges: Vec<&'static str>,
}

#[derive(Serialize)]
pub struct CacheSummary {
    pub entries: u64,
}

#[derive(Serialize)]
pub struct Invalidated {
    pub app_key: String,
}

#[derive(Serialize)]
pub struct StoreSummary {
    pub backend: &'static str,
    #[serde(flatten)]
    pub pool: PoolStatus,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let core = &state.core;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        stages: core.pipeline.stage_names(),
        routes: core.routes.load().len(),
        apps: core.registry.len(),
        judges: core.judges.ids(),
    })
}

pub async fn get_cache(State(state): State<AdminState>) -> Json<CacheSummary> {
    Json(CacheSummary {
        entries: state.core.cache.entry_count().await,
    })
}

/// Drop one caller from the cache so its next request reloads it.
pub async fn invalidate_cache(
    State(state): State<AdminState>,
    Path(app_key): Path<String>,
) -> Json<Invalidated> {
    state.core.cache.invalidate(&app_key).await;
    tracing::info!(app_key = %app_key, "Cache entry invalidated via admin API");
    Json(Invalidated { app_key })
}

pub async fn get_store(State(state): State<AdminState>) -> Json<StoreSummary> {
    Json(StoreSummary {
        backend: state.core.store.backend(),
        pool: state.core.store.status(),
    })
}
