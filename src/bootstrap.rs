//! Service discovery lifecycle.
//!
//! The service table is unknown until discovery succeeds once. Until then
//! a background task retries on a fixed interval, forever. After the first
//! success the table is installed and never replaced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::device::{ServiceDiscovery, ServiceTable};
use crate::error::DeviceError;

/// Default delay between discovery attempts.
pub const SERVICE_LOAD_RETRY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Unloaded,
    Loaded,
}

/// Holds the discovered service table behind a short read/write guard.
#[derive(Default)]
pub struct BootstrapGuard {
    table: RwLock<Option<Arc<ServiceTable>>>,
    attempts: AtomicU64,
}

impl BootstrapGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BootstrapState {
        if self.read().is_some() {
            BootstrapState::Loaded
        } else {
            BootstrapState::Unloaded
        }
    }

    /// The installed table, or `None` while still unloaded.
    pub fn services(&self) -> Option<Arc<ServiceTable>> {
        self.read().clone()
    }

    /// Number of discovery attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Installs `table` if nothing is installed yet. Returns false if the
    /// guard was already loaded; the existing table is kept.
    pub fn install(&self, table: ServiceTable) -> bool {
        let mut guard = self.table.write().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return false;
        }
        *guard = Some(Arc::new(table));
        true
    }

    /// Runs one discovery attempt unless already loaded.
    pub fn try_load(&self, discovery: &dyn ServiceDiscovery) -> Result<BootstrapState, DeviceError> {
        if self.state() == BootstrapState::Loaded {
            return Ok(BootstrapState::Loaded);
        }

        self.attempts.fetch_add(1, Ordering::Relaxed);
        let table = discovery.discover()?;
        let services = table.services.len();
        let actions = table.action_count();
        if self.install(table) {
            info!(
                "✅ Services loaded: {} services, {} actions",
                services, actions
            );
        }
        Ok(BootstrapState::Loaded)
    }

    /// Retries discovery every `retry` until it succeeds once.
    pub async fn run(self: Arc<Self>, discovery: Arc<dyn ServiceDiscovery>, retry: Duration) {
        loop {
            let guard = Arc::clone(&self);
            let d = Arc::clone(&discovery);
            match tokio::task::spawn_blocking(move || guard.try_load(d.as_ref())).await {
                Ok(Ok(_)) => return,
                Ok(Err(e)) => {
                    warn!(
                        "Cannot load services: {} - retrying in {}s",
                        e,
                        retry.as_secs()
                    );
                }
                Err(e) => {
                    error!("Service discovery task failed: {}", e);
                }
            }
            tokio::time::sleep(retry).await;
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Arc<ServiceTable>>> {
        self.table.read().unwrap_or_else(|e| e.into_inner())
    }
}
