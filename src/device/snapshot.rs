//! Snapshot-backed device.
//!
//! Serves recorded UPnP responses and Lua pages from a JSON file instead of
//! a live router. Used for dry runs, the `collect` subcommand and tests.
//!
//! ```json
//! {
//!   "services": {
//!     "urn:dslforum-org:service:Hosts:1": {
//!       "controlUrl": "/upnp/control/hosts",
//!       "actions": {
//!         "GetHostNumberOfEntries": { "response": { "NewHostNumberOfEntries": 2 } },
//!         "GetGenericHostEntry": {
//!           "inputs": ["NewIndex"],
//!           "responses": { "0": { "NewHostName": "NAS" }, "1": { "NewHostName": "TV" } }
//!         }
//!       }
//!     }
//!   },
//!   "pages": { "data.lua?page=ecoStat": { "data": { "cputemp": "55" } } }
//! }
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::device::action::{
    Action, ActionInfo, CallArgument, FieldMap, FieldValue, Service, ServiceDiscovery,
    ServiceTable,
};
use crate::device::page::{PageLoader, PageRequest, SessionCredential};
use crate::error::{ConfigError, DeviceError};

#[derive(Debug, Default, Deserialize)]
struct SnapshotFile {
    #[serde(default)]
    services: BTreeMap<String, SnapshotService>,
    #[serde(default)]
    pages: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct SnapshotService {
    #[serde(default, rename = "controlUrl")]
    control_url: String,
    #[serde(default)]
    actions: BTreeMap<String, SnapshotAction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SnapshotAction {
    #[serde(default)]
    inputs: Vec<String>,
    #[serde(default)]
    response: Option<Map<String, Value>>,
    #[serde(default)]
    responses: BTreeMap<String, Map<String, Value>>,
}

impl SnapshotAction {
    fn to_field_map(recorded: &Map<String, Value>) -> FieldMap {
        let mut fields = FieldMap::new();
        for (name, value) in recorded {
            match FieldValue::from_json(value) {
                Some(v) => {
                    fields.insert(name.clone(), v);
                }
                None => trace!("skipping unsupported snapshot value {}={}", name, value),
            }
        }
        fields
    }
}

impl Action for SnapshotAction {
    fn call(&self, argument: Option<&CallArgument>) -> Result<FieldMap, DeviceError> {
        let recorded = match argument {
            Some(arg) => self.responses.get(&arg.value).ok_or_else(|| {
                DeviceError::Request(format!(
                    "no recorded response for {}={}",
                    arg.name, arg.value
                ))
            })?,
            None => self
                .response
                .as_ref()
                .ok_or_else(|| DeviceError::Request("no recorded response".to_string()))?,
        };
        Ok(Self::to_field_map(recorded))
    }

    fn info(&self) -> ActionInfo {
        let outputs = self
            .response
            .as_ref()
            .or_else(|| self.responses.values().next())
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();

        ActionInfo {
            inputs: self.inputs.clone(),
            outputs,
        }
    }
}

/// A router replayed from a snapshot file.
pub struct SnapshotDevice {
    snapshot: SnapshotFile,
    session: SessionCredential,
    logins: AtomicU64,
}

impl SnapshotDevice {
    /// Loads a snapshot from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let snapshot: SnapshotFile =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse {
                path: "<snapshot>".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            snapshot,
            session: SessionCredential::new(),
            logins: AtomicU64::new(0),
        })
    }

    /// Number of times the loader had to establish a new session.
    pub fn login_count(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    fn login(&self) {
        let n = self.logins.fetch_add(1, Ordering::Relaxed) + 1;
        self.session.set(format!("{n:016x}"));
        debug!("snapshot session established (login #{})", n);
    }
}

impl ServiceDiscovery for SnapshotDevice {
    fn discover(&self) -> Result<ServiceTable, DeviceError> {
        let mut table = ServiceTable::default();
        for (id, svc) in &self.snapshot.services {
            let mut service = Service {
                control_url: svc.control_url.clone(),
                ..Service::default()
            };
            for (name, action) in &svc.actions {
                service
                    .actions
                    .insert(name.clone(), Arc::new(action.clone()) as Arc<dyn Action>);
            }
            table.services.insert(id.clone(), service);
        }
        Ok(table)
    }
}

impl PageLoader for SnapshotDevice {
    fn load(&self, page: &PageRequest) -> Result<Vec<u8>, DeviceError> {
        if !self.session.is_set() {
            self.login();
        }

        let body = self
            .snapshot
            .pages
            .get(&page.cache_key())
            .or_else(|| self.snapshot.pages.get(&page.path))
            .ok_or_else(|| DeviceError::Request(format!("page {page} not recorded")))?;

        serde_json::to_vec(body).map_err(|e| DeviceError::InvalidResponse(e.to_string()))
    }

    fn session(&self) -> &SessionCredential {
        &self.session
    }
}
