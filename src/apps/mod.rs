//! Caller profiles.
//!
//! # Data Flow
//! ```text
//! caller key
//!     → cache.rs (TTL cache, single-flight fill)
//!     → on miss: AppInfoSource::load (registry.rs or any other store)
//!     → AppInfo (immutable, shared via Arc)
//! ```

pub mod cache;
pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::AppConfig;

pub use cache::AppInfoCache;
pub use registry::StaticAppRegistry;

/// Caller profile with its limit thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    pub id: String,
    pub key: String,
    pub name: String,
    pub daily_limit: u64,
    pub minutely_limit: u64,
}

impl From<&AppConfig> for AppInfo {
    fn from(config: &AppConfig) -> Self {
        Self {
            id: config.id.clone(),
            key: config.key.clone(),
            name: config.name.clone(),
            daily_limit: config.daily_limit,
            minutely_limit: config.minutely_limit,
        }
    }
}

/// Failure while loading a caller from its backing store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppLoadError {
    /// The key is not provisioned.
    #[error("unknown app key '{0}'")]
    NotFound(String),

    /// The backing store could not answer.
    #[error("app store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent store of caller profiles.
#[async_trait]
pub trait AppInfoSource: Send + Sync {
    /// Load a caller by key.
    async fn load(&self, key: &str) -> Result<Arc<AppInfo>, AppLoadError>;
}
