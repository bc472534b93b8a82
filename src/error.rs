//! Error types for catalog loading and metric collection.
//!
//! `ConfigError` is fatal and surfaces before the first collection pass.
//! `CollectError` is always scoped to a single descriptor (or a single
//! indexed call) and only ever results in a counted, skipped sample.

use std::fmt;

/// Fatal catalog or configuration problems detected at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid metric #{index} ({name}): {reason}")]
    InvalidDescriptor {
        index: usize,
        name: String,
        reason: String,
    },

    #[error("Invalid label rename pattern '{pattern}': {source}")]
    InvalidRenamePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to register metric {name}: {source}")]
    Registration {
        name: String,
        #[source]
        source: prometheus::Error,
    },
}

/// Failures reported by device collaborators (transport, login, payload).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Coarse error classes used for logging and accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Resolution,
    Fetch,
    Decode,
    Type,
    DuplicateSeries,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Resolution => "resolution",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Decode => "decode",
            ErrorKind::Type => "type",
            ErrorKind::DuplicateSeries => "duplicate_series",
        };
        f.write_str(s)
    }
}

/// Per-descriptor collection failures. None of these abort a pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollectError {
    #[error("service {0} not found")]
    UnknownService(String),

    #[error("action {action} not found in service {service}")]
    UnknownAction { service: String, action: String },

    #[error("provider action {provider} has no result {field}")]
    MissingProviderField { provider: String, field: String },

    #[error("index count '{0}' is not a non-negative integer")]
    InvalidIndexCount(String),

    #[error("result has no field {0}")]
    MissingResult(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("extraction failed: {0}")]
    Extract(String),

    #[error("unsupported value type {0}")]
    UnsupportedType(String),

    #[error("series reported before as: {0}")]
    DuplicateSeries(String),
}

impl CollectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CollectError::UnknownService(_)
            | CollectError::UnknownAction { .. }
            | CollectError::MissingProviderField { .. }
            | CollectError::InvalidIndexCount(_)
            | CollectError::MissingResult(_)
            | CollectError::Extract(_) => ErrorKind::Resolution,
            CollectError::Fetch(_) => ErrorKind::Fetch,
            CollectError::Decode(_) => ErrorKind::Decode,
            CollectError::UnsupportedType(_) => ErrorKind::Type,
            CollectError::DuplicateSeries(_) => ErrorKind::DuplicateSeries,
        }
    }
}
