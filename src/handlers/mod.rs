//! HTTP endpoint handlers for the exporter.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/metrics`: Prometheus metrics endpoint, runs one collection pass
//! - `/health`: Health check endpoint
//! - `/`: Landing page

pub mod health;
pub mod metrics;
pub mod root;

// Re-export handlers
pub use health::health_handler;
pub use metrics::{encode_registry, metrics_handler};
pub use root::root_handler;
