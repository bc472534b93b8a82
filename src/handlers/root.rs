//! Root endpoint handler for the landing page.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");

    let version = env!("CARGO_PKG_VERSION");
    let uptime_secs = state.start_time.elapsed().as_secs();
    let uptime_str = format!(
        "{}h {}m {}s",
        uptime_secs / 3600,
        (uptime_secs % 3600) / 60,
        uptime_secs % 60
    );

    let catalog = state.engine.catalog();
    let health_link = if state.config.enable_health.unwrap_or(true) {
        r#"<li><a href="/health">/health</a> - service discovery state and collection statistics</li>"#
    } else {
        ""
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>FRITZ!Box Exporter</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 40px; line-height: 1.6; }}
        code {{ background: #e9ecef; padding: 2px 6px; border-radius: 3px; }}
    </style>
</head>
<body>
    <h1>FRITZ!Box Exporter</h1>
    <p>Version <code>{version}</code> | gateway <code>{gateway}</code> | uptime {uptime}</p>
    <p>{actions} action metrics, {pages} page metrics</p>
    <ul>
        <li><a href="/metrics">/metrics</a> - Prometheus metrics</li>
        {health_link}
    </ul>
</body>
</html>"#,
        version = version,
        gateway = state.engine.gateway(),
        uptime = uptime_str,
        actions = catalog.actions().len(),
        pages = catalog.pages().len(),
        health_link = health_link,
    );

    Html(html)
}
