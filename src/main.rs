//! Quota Gateway
//!
//! An API gateway that authenticates callers, enforces per-caller quotas
//! against a shared counting store and forwards accepted requests upstream.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────────────────────────────────────────┐
//!                   │                      QUOTA GATEWAY                        │
//!                   │                                                           │
//!   Client Request  │  ┌─────────┐   ┌─────────┐   ┌──────────┐   ┌─────────┐  │
//!   ────────────────┼─▶│  http   │──▶│ prepare │──▶│ validate │──▶│ forward │──┼──▶ Backend
//!                   │  │ server  │   │ (route) │   │ (quota)  │   │ (proxy) │  │
//!                   │  └─────────┘   └─────────┘   └────┬─────┘   └────┬────┘  │
//!                   │                                   │              │       │
//!                   │                        ┌──────────┴───┐          │       │
//!                   │                        │ apps cache + │          │       │
//!                   │                        │ counter store│          │       │
//!                   │                        └──────────────┘          │       │
//!   Client Response │  ┌──────────────────┐                            │       │
//!   ◀───────────────┼──│ ResponseEnvelope │◀───────────────────────────┘       │
//!                   │  └──────────────────┘                                    │
//!                   │                                                           │
//!                   │  config (watch/reload) · observability · admin · lifecycle│
//!                   └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use quota_gateway::config::{load_config, watcher::ConfigWatcher, GatewayConfig};
use quota_gateway::http::HttpServer;
use quota_gateway::lifecycle::{signals, Shutdown};
use quota_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "quota-gateway")]
#[command(about = "API gateway with per-caller quotas", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!("quota-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        apps = config.apps.len(),
        store = ?config.store.mode,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the lifetime of the process.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let server = HttpServer::new(config.clone())?;

    if config.admin.enabled {
        let admin = quota_gateway::admin::serve(
            config.admin.clone(),
            server.core().clone(),
            shutdown.subscribe(),
        );
        tokio::spawn(async move {
            if let Err(e) = admin.await {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("quota-gateway stopped");
    Ok(())
}
