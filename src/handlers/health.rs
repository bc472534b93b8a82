//! Health check endpoint handler.
//!
//! Returns 503 until the router's service description has been loaded.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use fritzbox_exporter::{BootstrapState, HealthContext};
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let loaded = state.bootstrap.state() == BootstrapState::Loaded;
    let (status, message) = if loaded {
        (StatusCode::OK, "OK")
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Services not loaded yet",
        )
    };

    let uptime_hours = state.start_time.elapsed().as_secs_f64() / SECONDS_PER_HOUR;
    let uptime_str = if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    };

    let (cache_hits, cache_misses) = state.cache_totals();
    let table = state.health_stats.render_table(&HealthContext {
        services_loaded: loaded,
        cache_hits,
        cache_misses,
    });

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!(
            "{message}\n\nGateway: {}\nUptime: {uptime_str}\nDiscovery attempts: {}\n\n{table}",
            state.engine.gateway(),
            state.bootstrap.attempts()
        ),
    )
}
