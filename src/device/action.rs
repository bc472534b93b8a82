//! UPnP action interfaces and the discovered service table.

use ahash::AHashMap as HashMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::{CollectError, DeviceError};

/// A single typed value from an action response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Short type name used in log and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Unsigned(_) => "unsigned",
            FieldValue::Signed(_) => "signed",
            FieldValue::Bool(_) => "bool",
            FieldValue::Text(_) => "string",
        }
    }

    /// Converts a JSON scalar into a field value. Floats, arrays, objects
    /// and null have no counterpart in an action response.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(FieldValue::Bool(*b)),
            serde_json::Value::String(s) => Some(FieldValue::Text(s.clone())),
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(FieldValue::Unsigned)
                .or_else(|| n.as_i64().map(FieldValue::Signed)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Unsigned(v) => write!(f, "{v}"),
            FieldValue::Signed(v) => write!(f, "{v}"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

/// Raw action response: output argument name to value.
pub type FieldMap = HashMap<String, FieldValue>;

/// Input argument passed to an action call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallArgument {
    pub name: String,
    pub value: String,
}

/// Argument metadata for listing actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionInfo {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl ActionInfo {
    /// True when the action can be called without any input argument.
    pub fn is_get_only(&self) -> bool {
        self.inputs.is_empty() && !self.outputs.is_empty()
    }
}

/// A callable action of a discovered service.
pub trait Action: Send + Sync {
    fn call(&self, argument: Option<&CallArgument>) -> Result<FieldMap, DeviceError>;

    fn info(&self) -> ActionInfo {
        ActionInfo::default()
    }
}

/// One discovered service and its actions.
#[derive(Clone, Default)]
pub struct Service {
    pub control_url: String,
    pub actions: HashMap<String, Arc<dyn Action>>,
}

/// All services found by discovery. Immutable once installed.
#[derive(Clone, Default)]
pub struct ServiceTable {
    pub services: HashMap<String, Service>,
}

impl ServiceTable {
    /// Resolves a service/action pair to its callable.
    pub fn action(&self, service: &str, action: &str) -> Result<&Arc<dyn Action>, CollectError> {
        let svc = self
            .services
            .get(service)
            .ok_or_else(|| CollectError::UnknownService(service.to_string()))?;

        svc.actions
            .get(action)
            .ok_or_else(|| CollectError::UnknownAction {
                service: service.to_string(),
                action: action.to_string(),
            })
    }

    /// Service identifiers in sorted order.
    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn action_count(&self) -> usize {
        self.services.values().map(|s| s.actions.len()).sum()
    }
}

/// Builds the service table from the device's service descriptions.
pub trait ServiceDiscovery: Send + Sync {
    fn discover(&self) -> Result<ServiceTable, DeviceError>;
}
