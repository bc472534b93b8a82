//! Re-authentication policy for page fetches.
//!
//! The router silently expires Lua sessions. Any failed page load therefore
//! drops the loader's session id so that the next load logs in again. There
//! is no backoff here: the scrape interval is the retry interval.

use std::sync::Arc;
use tracing::warn;

use crate::device::{PageLoader, PageRequest};
use crate::error::DeviceError;

pub struct SessionReauthCoordinator {
    loader: Arc<dyn PageLoader>,
}

impl SessionReauthCoordinator {
    pub fn new(loader: Arc<dyn PageLoader>) -> Self {
        Self { loader }
    }

    /// Loads `page`, clearing the session credential if the load fails.
    pub fn load(&self, page: &PageRequest) -> Result<Vec<u8>, DeviceError> {
        self.loader.load(page).map_err(|e| {
            warn!("Error loading {}: {} - forcing re-authentication", page, e);
            self.loader.session().clear();
            e
        })
    }
}
