//! Application state management for the exporter.
//!
//! This module wires the collection stack together and defines the shared
//! application state that is passed to HTTP handlers.

use fritzbox_exporter::{
    BootstrapGuard, CollectionEngine, EngineMetrics, HealthStats, Namespace, PageSource,
    SeriesExporter, SnapshotDevice, SystemClock,
};
use prometheus::Registry;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{gateway_host, load_catalog, Config};

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Collection stack shared by the server and the one-shot subcommands.
pub struct Pipeline {
    pub registry: Registry,
    pub engine: Arc<CollectionEngine>,
    pub exporter: SeriesExporter,
    pub bootstrap: Arc<BootstrapGuard>,
    pub device: Arc<SnapshotDevice>,
}

impl Pipeline {
    /// Loads catalogs and the device, and registers all metrics.
    pub fn build(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let catalog = load_catalog(config)?;
        let device = Arc::new(open_device(config)?);

        let registry = Registry::new();
        let metrics = EngineMetrics::new(&registry)?;
        let exporter = SeriesExporter::new(&registry, &catalog)?;
        debug!(
            "Registered {} metric families for {} action and {} page metrics",
            exporter.family_count(),
            catalog.actions().len(),
            catalog.pages().len()
        );

        let gateway = gateway_host(config)?;
        let bootstrap = Arc::new(BootstrapGuard::new());
        let mut engine = CollectionEngine::new(
            Arc::new(catalog),
            Arc::clone(&bootstrap),
            gateway,
            metrics,
            Arc::new(SystemClock),
        );
        if config.lua_enabled() {
            engine = engine.with_pages(PageSource::new(device.clone()));
        } else {
            info!("Lua page metrics disabled");
        }

        Ok(Self {
            registry,
            engine: Arc::new(engine),
            exporter,
            bootstrap,
            device,
        })
    }
}

/// Opens the device collaborator configured for this process.
pub fn open_device(config: &Config) -> Result<SnapshotDevice, Box<dyn std::error::Error>> {
    let path = config
        .snapshot_file
        .as_deref()
        .ok_or("snapshot_file is not set; no device to collect from")?;
    let device = SnapshotDevice::from_file(Path::new(path))?;
    info!("Serving device responses from snapshot: {}", path.display());
    Ok(device)
}

/// Global application state shared across requests and background tasks.
pub struct AppState {
    pub registry: Registry,
    pub engine: Arc<CollectionEngine>,
    pub exporter: SeriesExporter,
    pub bootstrap: Arc<BootstrapGuard>,
    pub health_stats: Arc<HealthStats>,
    pub config: Arc<Config>,
    /// Serializes collection passes; the caches assume one pass at a time.
    pub scrape_lock: Mutex<()>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(pipeline: Pipeline, config: Config) -> Self {
        Self {
            registry: pipeline.registry,
            engine: pipeline.engine,
            exporter: pipeline.exporter,
            bootstrap: pipeline.bootstrap,
            health_stats: Arc::new(HealthStats::new()),
            config: Arc::new(config),
            scrape_lock: Mutex::new(()),
            start_time: Instant::now(),
        }
    }

    /// Sum of cache hits and misses over all namespaces.
    pub fn cache_totals(&self) -> (u64, u64) {
        let metrics = self.engine.metrics();
        [Namespace::Upnp, Namespace::Lua]
            .iter()
            .fold((0, 0), |(hits, misses), ns| {
                let counters = metrics.cache_counters(*ns);
                (hits + counters.cached.get(), misses + counters.loaded.get())
            })
    }
}
