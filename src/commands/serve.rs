use anyhow::{Context, Result};
use recrawl::{
    clock::{SharedClock, SystemClock},
    config::{Config, StorageBackend},
    daemon::Daemon,
    metrics::Metrics,
    storage::{MemoryStore, SharedStore, SledStore},
    vendor::{CachedSources, HttpVendorClient, MeteredVendor, RetryPolicy, RetryingVendor, SharedVendor},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Open the configured campaign store
pub fn open_store(config: &Config) -> Result<SharedStore> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; campaigns are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Sled => {
            let path = config.storage.resolve_path(&config.daemon.data_dir);
            let store = SledStore::open(&path)
                .with_context(|| format!("Failed to open campaign database {}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}

/// Production vendor stack: HTTP, capped retry, metrics, cached source lookups
fn build_vendor(config: &Config, clock: SharedClock, metrics: Arc<Metrics>) -> Result<SharedVendor> {
    let http = HttpVendorClient::new(&config.vendor).context("Failed to build vendor client")?;
    let retrying = RetryingVendor::new(http, RetryPolicy::from_config(&config.vendor));
    let metered = MeteredVendor::new(retrying, metrics);
    let cached = CachedSources::new(
        metered,
        config.vendor.cache_capacity,
        Duration::from_secs(config.vendor.cache_ttl_secs),
        clock,
    );
    Ok(Arc::new(cached))
}

/// Run the daemon in the foreground until interrupted
pub async fn serve(config: Config) -> Result<()> {
    if config.vendor.api_key.is_none() {
        anyhow::bail!(
            "No vendor API key configured. Set vendor.api_key or {}",
            recrawl::config::API_KEY_ENV
        );
    }

    let clock: SharedClock = Arc::new(SystemClock);
    let metrics = Metrics::shared();
    std::fs::create_dir_all(&config.daemon.data_dir).with_context(|| {
        format!("Failed to create data directory {}", config.daemon.data_dir.display())
    })?;
    let store = open_store(&config)?;
    let vendor = build_vendor(&config, clock.clone(), metrics.clone())?;

    info!(
        "Polling every {}s, stall window {}s, {} recoveries max",
        config.monitor.poll_interval_secs,
        config.monitor.idle_threshold_secs,
        config.monitor.max_recovery_attempts
    );

    let daemon = Daemon::start(config, store, vendor, clock, metrics)?;
    daemon.run().await
}
