//! Second stage: identify the caller and enforce its quotas.
//!
//! # Data Flow
//! ```text
//! caller key (header, then query parameter)
//!     → AppInfoCache::get_or_load
//!     → borrow one store session
//!     → queue one counter command per judge, exec once
//!     → release session
//!     → judges evaluated in order; first failure halts
//! ```
//!
//! Counters are incremented for every judge before any of them is evaluated,
//! so a rejected request still consumes quota from the later windows.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::apps::{AppInfo, AppInfoCache, AppInfoSource, AppLoadError};
use crate::config::ValidationConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::pipeline::{RequestContext, Stage, StageOutcome};
use crate::quota::{CounterStore, JudgeRegistry, JudgeResultSet};

pub struct ValidateStage {
    cache: AppInfoCache,
    source: Arc<dyn AppInfoSource>,
    store: Arc<dyn CounterStore>,
    judges: JudgeRegistry,
    key_header: String,
    key_query: String,
}

impl ValidateStage {
    pub fn new(
        cache: AppInfoCache,
        source: Arc<dyn AppInfoSource>,
        store: Arc<dyn CounterStore>,
        judges: JudgeRegistry,
        config: &ValidationConfig,
    ) -> Self {
        Self {
            cache,
            source,
            store,
            judges,
            key_header: config.key_header.to_lowercase(),
            key_query: config.key_query.clone(),
        }
    }

    fn caller_key(&self, ctx: &RequestContext) -> Option<String> {
        let from_header = (!self.key_header.is_empty())
            .then(|| ctx.inbound.headers.get(self.key_header.as_str()))
            .flatten()
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string());

        from_header
            .or_else(|| {
                (!self.key_query.is_empty())
                    .then(|| ctx.inbound.query_param(&self.key_query))
                    .flatten()
            })
            .filter(|k| !k.is_empty())
    }

    async fn resolve_caller(&self, key: &str) -> GatewayResult<Arc<AppInfo>> {
        self.cache
            .get_or_load(key, self.source.as_ref())
            .await
            .map_err(|e| match e {
                AppLoadError::NotFound(key) => GatewayError::UnknownCaller(key),
                AppLoadError::Unavailable(msg) => GatewayError::ValidationServiceUnavailable(msg),
            })
    }

    /// One batched round trip, then evaluate judges in registration order.
    async fn check_quota(&self, app: &AppInfo) -> GatewayResult<()> {
        if self.judges.is_empty() {
            return Ok(());
        }

        let mut session = self.store.session().await.map_err(|e| {
            metrics::record_store_failure(e.kind());
            GatewayError::ValidationServiceUnavailable(e.to_string())
        })?;

        let now = SystemTime::now();
        let mut results = JudgeResultSet::default();
        for judge in self.judges.iter() {
            let reply = session.queue_incr(judge.command(app, now));
            results.push(judge.clone(), reply);
        }

        let executed = session.exec().await;
        drop(session);
        metrics::record_store_sessions(self.store.status().in_use);

        if let Err(e) = executed {
            metrics::record_store_failure(e.kind());
            return Err(GatewayError::ValidationServiceUnavailable(e.to_string()));
        }

        for (judge, reply) in results {
            let count = reply.get().map_err(|e| {
                metrics::record_store_failure(e.kind());
                GatewayError::ValidationServiceUnavailable(e.to_string())
            })?;

            if !judge.judge(app, count) {
                metrics::record_judge_rejection(judge.id());
                tracing::info!(app_key = %app.key, judge = judge.id(), count, "Quota exceeded");
                return Err(GatewayError::LimitExceeded { judge: judge.id() });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Stage for ValidateStage {
    fn name(&self) -> &'static str {
        "validate"
    }

    async fn pre_handle(&self, ctx: &mut RequestContext) -> StageOutcome {
        let Some(key) = self.caller_key(ctx) else {
            return StageOutcome::Halt(GatewayError::MissingCallerKey);
        };

        let app = match self.resolve_caller(&key).await {
            Ok(app) => app,
            Err(e) => return StageOutcome::Halt(e),
        };

        if let Err(e) = self.check_quota(&app).await {
            return StageOutcome::Halt(e);
        }

        tracing::debug!(request_id = %ctx.request_id, app_id = %app.id, "Caller validated");
        ctx.app = Some(app);
        StageOutcome::Continue
    }
}
