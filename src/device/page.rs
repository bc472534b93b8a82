//! Lua page fetch interfaces and the shared session credential.

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::DeviceError;

/// A page on the device's web UI plus its query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageRequest {
    pub path: String,
    pub params: String,
}

impl PageRequest {
    pub fn new(path: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: params.into(),
        }
    }

    /// Cache key for this page: path and parameters.
    pub fn cache_key(&self) -> String {
        format!("{}?{}", self.path, self.params)
    }
}

impl fmt::Display for PageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            f.write_str(&self.path)
        } else {
            write!(f, "{}?{}", self.path, self.params)
        }
    }
}

/// Session id held by a page loader. Cloning shares the same slot.
///
/// An empty slot means the loader has to log in again before its next fetch.
#[derive(Debug, Clone, Default)]
pub struct SessionCredential {
    sid: Arc<RwLock<Option<String>>>,
}

impl SessionCredential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.sid.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, sid: impl Into<String>) {
        *self.sid.write().unwrap_or_else(|e| e.into_inner()) = Some(sid.into());
    }

    pub fn clear(&self) {
        *self.sid.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn is_set(&self) -> bool {
        self.sid
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

/// Fetches raw page bodies using an internally held session.
pub trait PageLoader: Send + Sync {
    fn load(&self, page: &PageRequest) -> Result<Vec<u8>, DeviceError>;

    /// The session slot this loader authenticates with.
    fn session(&self) -> &SessionCredential;
}

/// Turns a raw page body into a JSON document.
pub trait PageDecoder: Send + Sync {
    fn decode(&self, body: &[u8]) -> Result<Value, DeviceError>;
}

/// Decoder for the JSON bodies returned by `data.lua` style pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPageDecoder;

impl PageDecoder for JsonPageDecoder {
    fn decode(&self, body: &[u8]) -> Result<Value, DeviceError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| DeviceError::InvalidResponse(e.to_string()))?;

        if !value.is_object() {
            return Err(DeviceError::InvalidResponse(
                "page body is not a JSON object".to_string(),
            ));
        }
        Ok(value)
    }
}
