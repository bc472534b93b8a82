//! Collect command implementation.
//!
//! Runs service discovery once, then a single collection pass, and prints the
//! resulting exposition to stdout.

use std::time::Instant;

use crate::config::Config;
use crate::handlers::encode_registry;
use crate::state::Pipeline;

pub fn command_collect(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = Pipeline::build(config)?;

    if let Err(e) = pipeline.bootstrap.try_load(pipeline.device.as_ref()) {
        eprintln!("❌ Cannot load services: {}", e);
        std::process::exit(1);
    }

    let start = Instant::now();
    let report = pipeline.engine.collect_pass();
    pipeline.exporter.publish(&report.samples);

    let metrics = pipeline.engine.metrics();
    metrics
        .scrape_duration_seconds
        .set(start.elapsed().as_secs_f64());
    metrics.services_loaded.set(1);

    let body = encode_registry(&pipeline.registry).map_err(|_| "Failed to encode metrics")?;
    print!("{body}");

    eprintln!(
        "📊 {} samples, {} action errors, {} page errors in {:.3}s",
        report.samples.len(),
        report.action_errors,
        report.page_errors,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
