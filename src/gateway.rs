//! Gateway assembly.
//!
//! # Responsibilities
//! - Build the shared subsystems once (routes, apps, cache, store, client)
//! - Wire them into the fixed Prepare → Validate → Forward pipeline
//! - Apply reloaded configuration without rebuilding the pipeline
//!
//! # Design Decisions
//! - Route table behind `ArcSwap`: readers never block a reload
//! - App registry is mutated in place; changed keys are evicted from the cache
//! - Judges, store and pool sizing are fixed for the process lifetime

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::apps::{AppInfoCache, AppInfoSource, StaticAppRegistry};
use crate::config::GatewayConfig;
use crate::pipeline::{ForwardStage, Pipeline, PrepareStage, Stage, ValidateStage};
use crate::proxy::UpstreamClient;
use crate::quota::{CounterStore, JudgeRegistry};
use crate::routing::RouteTable;

/// Shared state behind every request.
#[derive(Clone)]
pub struct GatewayCore {
    pub routes: Arc<ArcSwap<RouteTable>>,
    pub registry: Arc<StaticAppRegistry>,
    pub cache: AppInfoCache,
    pub store: Arc<dyn CounterStore>,
    pub judges: JudgeRegistry,
    pub pipeline: Arc<Pipeline>,
}

impl GatewayCore {
    /// Assemble the gateway around an already-built counting store.
    ///
    /// An unknown judge id disables quota checks with an error log; `validate_config`
    /// rejects them before a config ever reaches this point.
    pub fn build(config: &GatewayConfig, store: Arc<dyn CounterStore>) -> Self {
        let routes = Arc::new(ArcSwap::from_pointee(RouteTable::from_config(&config.routes)));
        let registry = Arc::new(StaticAppRegistry::new(&config.apps));
        let cache = AppInfoCache::new(&config.cache);

        let judges = JudgeRegistry::from_ids(&config.validation.judges).unwrap_or_else(|unknown| {
            tracing::error!(judge = %unknown, "Unknown judge id; quota checks disabled");
            JudgeRegistry::default()
        });

        let client = UpstreamClient::new(
            Duration::from_secs(config.timeouts.upstream_secs),
            config.proxy.max_response_size,
        );

        let source: Arc<dyn AppInfoSource> = registry.clone();
        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(PrepareStage::new(routes.clone(), &config.proxy)),
            Arc::new(ValidateStage::new(
                cache.clone(),
                source,
                store.clone(),
                judges.clone(),
                &config.validation,
            )),
            Arc::new(ForwardStage::new(client)),
        ];

        tracing::info!(
            routes = routes.load().len(),
            apps = registry.len(),
            judges = ?judges.ids(),
            store = store.backend(),
            "Gateway core assembled"
        );

        Self {
            routes,
            registry,
            cache,
            store,
            judges,
            pipeline: Arc::new(Pipeline::new(stages)),
        }
    }

    /// Swap in routes and apps from a reloaded config.
    pub async fn apply_config(&self, config: &GatewayConfig) {
        self.routes.store(Arc::new(RouteTable::from_config(&config.routes)));

        let changed = self.registry.replace_all(&config.apps);
        for key in &changed {
            self.cache.invalidate(key).await;
        }

        tracing::info!(
            routes = self.routes.load().len(),
            apps = self.registry.len(),
            invalidated = changed.len(),
            "Configuration applied"
        );
    }
}
