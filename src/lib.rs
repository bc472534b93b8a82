//! FRITZ!Box Exporter Library
//!
//! Catalog-driven collection engine for FRITZ!Box routers. Metrics are
//! described in data, not code: action metrics map a UPnP (TR-064) action
//! result field to a series, page metrics map values inside the router's
//! authenticated Lua JSON pages to series.
//!
//! # Features
//!
//! - **Result Cache**: every device call result is kept for at least the
//!   descriptor's TTL (never below a process-wide floor)
//! - **Argument Resolution**: literal, provider-indirected and index
//!   arguments, with index fan-out over `0..N`
//! - **Duplicate Protection**: a series is emitted at most once per pass
//! - **Self Healing**: failed page loads force a fresh login; service
//!   discovery retries until it succeeds
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use fritzbox_exporter::{
//!     BootstrapGuard, CollectionEngine, EngineMetrics, MetricCatalog, SnapshotDevice, SystemClock,
//! };
//! use prometheus::Registry;
//!
//! let registry = Registry::new();
//! let catalog = Arc::new(MetricCatalog::load(Path::new("metrics.json"), None, 30).unwrap());
//! let device = SnapshotDevice::from_file(Path::new("snapshot.json")).unwrap();
//!
//! let bootstrap = Arc::new(BootstrapGuard::new());
//! bootstrap.try_load(&device).unwrap();
//!
//! let engine = CollectionEngine::new(
//!     catalog,
//!     bootstrap,
//!     "fritz.box",
//!     EngineMetrics::new(&registry).unwrap(),
//!     Arc::new(SystemClock),
//! );
//! let report = engine.collect_pass();
//! println!("{} samples, {} errors", report.samples.len(), report.errors());
//! ```

pub mod bootstrap;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod device;
pub mod engine;
pub mod error;
pub mod health_stats;
pub mod metrics;
pub mod reporter;
pub mod session;

// Re-export main types for convenience
pub use bootstrap::{BootstrapGuard, BootstrapState, SERVICE_LOAD_RETRY};
pub use cache::{CacheOutcome, Namespace, ResultCache};
pub use catalog::{MetricCatalog, DEFAULT_MIN_CACHE_TTL};
pub use clock::{Clock, ManualClock, SystemClock};
pub use device::SnapshotDevice;
pub use engine::{CollectionEngine, PageSource, PassReport, MAX_INDEX_COUNT};
pub use error::{CollectError, ConfigError, DeviceError, ErrorKind};
pub use health_stats::{HealthContext, HealthStats};
pub use metrics::{EngineMetrics, SeriesExporter};
pub use reporter::{Reporter, Sample, SampleSource};
pub use session::SessionReauthCoordinator;
