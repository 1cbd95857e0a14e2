//! Offline Cache Proxy
//!
//! Serves an origin through a persistent request cache so that previously
//! seen pages, assets and API responses stay available when the origin is
//! unreachable.

mod config;
mod error;
mod origin;
mod server;
mod types;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::origin::OriginClient;
use crate::server::{start_server, ServerState, SharedState};
use offline_cache::{run_control_loop, ControlHandle, FileStore, OfflineCache};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("offline_cache_proxy=info".parse()?)
        .add_directive("offline_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Offline Cache Proxy...");

    let config = ProxyConfig::from_env()?;
    info!("Port: {}", config.port);
    info!("Origin: {}", config.origin_url);
    info!("Cache dir: {:?}", config.cache_dir);
    info!("Cache version: {}", config.version);
    info!("Cache TTL: {} seconds", config.ttl_secs);

    let store = FileStore::new(config.cache_dir.clone());
    store.init().await?;

    let cache = Arc::new(OfflineCache::new(Arc::new(store), config.cache_config())?);
    let origin = OriginClient::new(config.origin_url.clone());

    let (control, control_rx) = ControlHandle::channel();
    tokio::spawn(run_control_loop(cache.clone(), control_rx));

    // Seed the bootstrap set before accepting traffic
    let report = cache
        .install(&config.bootstrap_requests(), &origin)
        .await?;
    if !report.failed.is_empty() {
        warn!(failed = ?report.failed, "Some bootstrap resources were not seeded");
    }

    // Older generations are purged once the grace period elapses or a
    // ForceActivate message arrives
    {
        let cache = cache.clone();
        let grace = Duration::from_secs(config.activation_grace_secs);
        tokio::spawn(async move {
            if let Err(e) = cache.generations().activate_after(grace).await {
                warn!(error = %e, "Scheduled activation failed");
            }
        });
    }

    let state: SharedState = Arc::new(ServerState::new(cache, origin, control));

    // Start HTTP server (blocking)
    start_server(state, config.port)
        .await
        .map_err(|e| ProxyError::Config(format!("Server error: {}", e)))?;

    Ok(())
}
