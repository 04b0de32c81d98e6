//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (judge ids exist in the registry)
//! - Validate value ranges (pool size > 0, timeouts > 0)
//! - Detect duplicate caller keys
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use crate::config::schema::{GatewayConfig, StoreMode};
use crate::quota::judge::JudgeRegistry;

/// A single semantic problem in a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed config.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (i, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{}]", i);
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::new(
                format!("{}.path_prefix", field),
                "must start with '/'",
            ));
        }
        match url::Url::parse(&route.upstream) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
            Ok(u) => errors.push(ValidationError::new(
                format!("{}.upstream", field),
                format!("unsupported scheme '{}'", u.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(
                format!("{}.upstream", field),
                format!("invalid URL '{}': {}", route.upstream, e),
            )),
        }
    }

    let mut keys = HashSet::new();
    for (i, app) in config.apps.iter().enumerate() {
        if app.key.is_empty() {
            errors.push(ValidationError::new(format!("apps[{}].key", i), "must not be empty"));
        } else if !keys.insert(app.key.as_str()) {
            errors.push(ValidationError::new(
                format!("apps[{}].key", i),
                format!("duplicate key '{}'", app.key),
            ));
        }
    }

    if let Err(unknown) = JudgeRegistry::from_ids(&config.validation.judges) {
        errors.push(ValidationError::new(
            "validation.judges",
            format!("unknown judge '{}'", unknown),
        ));
    }
    if config.validation.key_header.is_empty() && config.validation.key_query.is_empty() {
        errors.push(ValidationError::new(
            "validation",
            "either key_header or key_query must be set",
        ));
    }

    if config.store.pool_size == 0 {
        errors.push(ValidationError::new("store.pool_size", "must be greater than 0"));
    }
    if config.store.mode == StoreMode::Redis && url::Url::parse(&config.store.url).is_err() {
        errors.push(ValidationError::new(
            "store.url",
            format!("invalid URL '{}'", config.store.url),
        ));
    }

    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::new("timeouts.upstream_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs <= config.timeouts.upstream_secs {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            format!(
                "must be greater than timeouts.upstream_secs ({})",
                config.timeouts.upstream_secs
            ),
        ));
    }
    if config.store.acquire_timeout_ms == 0 {
        errors.push(ValidationError::new("store.acquire_timeout_ms", "must be greater than 0"));
    }
    if config.store.command_timeout_ms == 0 {
        errors.push(ValidationError::new("store.command_timeout_ms", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
