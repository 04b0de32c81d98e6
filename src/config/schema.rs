//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Route definitions mapping inbound paths to upstream services.
    pub routes: Vec<RouteConfig>,

    /// Provisioned callers and their limit thresholds.
    pub apps: Vec<AppConfig>,

    /// Caller identification and judge registry.
    pub validation: ValidationConfig,

    /// Counting store connection settings.
    pub store: StoreConfig,

    /// Caller cache sizing.
    pub cache: CacheConfig,

    /// Forwarding behaviour.
    pub proxy: ProxyConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Route configuration mapping requests to an upstream base URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Host header to match (exact match).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: String,

    /// Upstream base URL, e.g. "http://127.0.0.1:3000/v1".
    pub upstream: String,

    /// Remove the matched prefix before joining onto the upstream URL.
    #[serde(default)]
    pub strip_prefix: bool,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

/// A provisioned caller.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AppConfig {
    pub id: String,
    pub key: String,
    pub name: String,
    pub daily_limit: u64,
    pub minutely_limit: u64,
}

/// Caller identification and judge registry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Header carrying the caller key.
    pub key_header: String,

    /// Query parameter carrying the caller key (fallback).
    pub key_query: String,

    /// Judge ids in evaluation order.
    pub judges: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            key_header: "x-app-key".to_string(),
            key_query: "appKey".to_string(),
            judges: vec!["daily".to_string(), "minutely".to_string()],
        }
    }
}

/// Which counting store backs the validation stage.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// In-process counters; single instance only.
    Memory,
    /// Shared Redis counters.
    Redis,
}

/// Counting store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub mode: StoreMode,

    /// Redis connection URL (redis mode only).
    pub url: String,

    /// Maximum sessions checked out at once.
    pub pool_size: usize,

    /// How long to wait for a free session, in milliseconds.
    pub acquire_timeout_ms: u64,

    /// Deadline for one batched round trip, in milliseconds.
    pub command_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode: StoreMode::Memory,
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 32,
            acquire_timeout_ms: 500,
            command_timeout_ms: 1000,
        }
    }
}

/// Caller cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for entries filled on a miss, in seconds.
    pub ttl_secs: u64,

    /// Maximum number of cached callers.
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 10_000,
        }
    }
}

/// Forwarding behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Drop connection-management headers before forwarding.
    pub strip_hop_by_hop: bool,

    /// Accept value used when the caller sends none.
    pub default_accept: String,

    /// Maximum upstream body size in bytes.
    pub max_response_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            strip_hop_by_hop: true,
            default_accept: "application/json".to_string(),
            max_response_size: 8 * 1024 * 1024,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request deadline enforced by the gateway handler, in seconds.
    /// Must be longer than `upstream_secs`.
    pub request_secs: u64,

    /// Upstream call timeout in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            upstream_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
