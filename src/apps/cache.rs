//! Read-through caller cache.
//!
//! # Responsibilities
//! - Serve caller profiles without touching the backing store
//! - Collapse concurrent misses for one key into a single load
//! - Expire entries per-entry TTL; accept pushed invalidations
//!
//! # Design Decisions
//! - moka owns the locking; readers never block each other
//! - Failed loads are not cached, so a newly provisioned key is visible on the next request

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::Expiry;

use crate::apps::{AppInfo, AppInfoSource, AppLoadError};
use crate::config::CacheConfig;
use crate::observability::metrics;

#[derive(Debug, Clone)]
struct CachedApp {
    app: Arc<AppInfo>,
    ttl: Duration,
}

/// Each entry expires after the TTL it was filled with.
struct PerEntryTtl;

impl Expiry<String, CachedApp> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &CachedApp, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedApp,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Caller cache keyed by caller key.
#[derive(Clone)]
pub struct AppInfoCache {
    inner: Cache<String, CachedApp>,
    default_ttl: Duration,
}

impl AppInfoCache {
    pub fn new(config: &CacheConfig) -> Self {
        let inner = Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self {
            inner,
            default_ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    /// Cached profile, if present and not expired.
    pub async fn get(&self, key: &str) -> Option<Arc<AppInfo>> {
        self.inner.get(key).await.map(|cached| cached.app)
    }

    /// Insert or refresh an entry.
    pub async fn fill(&self, key: &str, app: Arc<AppInfo>, ttl: Duration) {
        self.inner.insert(key.to_string(), CachedApp { app, ttl }).await;
    }

    /// Drop an entry; the next request reloads it.
    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
        tracing::debug!(app_key = %key, "Caller cache entry invalidated");
    }

    /// Cached profile, or load it once from `source` and fill the cache.
    ///
    /// Concurrent callers for the same missing key wait on one load and all
    /// receive the same `Arc`.
    pub async fn get_or_load(
        &self,
        key: &str,
        source: &dyn AppInfoSource,
    ) -> Result<Arc<AppInfo>, AppLoadError> {
        if let Some(app) = self.get(key).await {
            metrics::record_cache_lookup(true);
            return Ok(app);
        }
        metrics::record_cache_lookup(false);

        let ttl = self.default_ttl;
        self.inner
            .try_get_with(key.to_string(), async move {
                metrics::record_cache_load();
                tracing::debug!(app_key = %key, "Loading caller profile");
                source.load(key).await.map(|app| CachedApp { app, ttl })
            })
            .await
            .map(|cached| cached.app)
            .map_err(|e| (*e).clone())
    }

    /// Approximate number of live entries.
    pub async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}
