//! Config-provisioned caller registry.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::apps::{AppInfo, AppInfoSource, AppLoadError};
use crate::config::AppConfig;

/// Callers provisioned from the `[[apps]]` table.
///
/// Replaced wholesale on config reload; the keys that changed are reported
/// back so cached copies can be invalidated.
#[derive(Debug, Default)]
pub struct StaticAppRegistry {
    apps: DashMap<String, Arc<AppInfo>>,
}

impl StaticAppRegistry {
    pub fn new(configs: &[AppConfig]) -> Self {
        let registry = Self::default();
        for config in configs {
            registry
                .apps
                .insert(config.key.clone(), Arc::new(AppInfo::from(config)));
        }
        registry
    }

    /// Add or overwrite one caller.
    pub fn upsert(&self, app: AppInfo) {
        self.apps.insert(app.key.clone(), Arc::new(app));
    }

    /// Remove one caller.
    pub fn remove(&self, key: &str) -> bool {
        self.apps.remove(key).is_some()
    }

    /// Replace the registry contents and return every key that was added,
    /// removed or modified.
    pub fn replace_all(&self, configs: &[AppConfig]) -> Vec<String> {
        let mut changed = Vec::new();
        let mut seen = HashSet::new();

        for config in configs {
            seen.insert(config.key.clone());
            let incoming = AppInfo::from(config);
            let differs = self
                .apps
                .get(&config.key)
                .map(|existing| **existing != incoming)
                .unwrap_or(true);
            if differs {
                self.apps.insert(config.key.clone(), Arc::new(incoming));
                changed.push(config.key.clone());
            }
        }

        let stale: Vec<String> = self
            .apps
            .iter()
            .filter(|entry| !seen.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for key in stale {
            self.apps.remove(&key);
            changed.push(key);
        }

        changed
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

#[async_trait]
impl AppInfoSource for StaticAppRegistry {
    async fn load(&self, key: &str) -> Result<Arc<AppInfo>, AppLoadError> {
        self.apps
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppLoadError::NotFound(key.to_string()))
    }
}
