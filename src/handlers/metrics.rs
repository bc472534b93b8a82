//! Metrics endpoint handler for Prometheus scraping.
//!
//! Every scrape runs one collection pass. Results the device was asked for
//! recently are served from the engine's cache, so scrapes are cheap as long
//! as they come in faster than the descriptors' TTLs.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    CollectionFailed,
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        let message = match self {
            MetricsError::CollectionFailed => "Failed to collect metrics",
            MetricsError::EncodingFailed => "Failed to encode metrics",
        };
        (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
    }
}

/// Encodes all metrics of `registry` in the Prometheus text format.
pub fn encode_registry(registry: &Registry) -> Result<String, MetricsError> {
    let families = registry.gather();
    let mut buffer = Vec::with_capacity(BUFFER_CAP);

    if TextEncoder::new().encode(&families, &mut buffer).is_err() {
        error!("Failed to encode Prometheus metrics");
        return Err(MetricsError::EncodingFailed);
    }

    String::from_utf8(buffer).map_err(|_| MetricsError::EncodingFailed)
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    let start = Instant::now();
    debug!("Processing /metrics request");
    state.health_stats.record_metrics_endpoint_call();

    // one pass at a time; the pass itself blocks on device calls
    let _guard = state.scrape_lock.lock().await;
    let engine = Arc::clone(&state.engine);
    let report = tokio::task::spawn_blocking(move || engine.collect_pass())
        .await
        .map_err(|e| {
            error!("Collection pass panicked: {}", e);
            MetricsError::CollectionFailed
        })?;

    state.exporter.publish(&report.samples);

    let metrics = state.engine.metrics();
    let elapsed = start.elapsed().as_secs_f64();
    metrics.scrape_duration_seconds.set(elapsed);
    metrics
        .services_loaded
        .set(if report.services_loaded { 1 } else { 0 });
    state.health_stats.record_pass(&report, elapsed);

    let body = encode_registry(&state.registry)?;
    debug!(
        "Metrics request completed: {} samples, {} errors, {} bytes, {:.3}s",
        report.samples.len(),
        report.errors(),
        body.len(),
        elapsed
    );
    Ok(body)
}
