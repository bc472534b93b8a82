//! Health statistics for the exporter.
//!
//! Tracks collection pass performance and HTTP usage, rendered as a plain
//! text table on `/health`.

use chrono::{DateTime, Local};
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Instant;

use crate::engine::PassReport;

/// Running statistics for a single value.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            *self = Self {
                count: 1,
                sum: value,
                min: value,
                max: value,
                last: value,
            };
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// Returns (last, avg, max, min, count).
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Counters exposed on the health endpoint.
pub struct HealthStats {
    pub pass_duration_seconds: Stat,
    pub samples_per_pass: Stat,
    pub errors_per_pass: Stat,
    pub total_passes: AtomicU64,
    pub skipped_passes: AtomicU64,
    pub metrics_endpoint_calls: AtomicU64,
    pub start_time: Instant,
    pub last_pass_time: RwLock<Option<DateTime<Local>>>,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            pass_duration_seconds: Stat::default(),
            samples_per_pass: Stat::default(),
            errors_per_pass: Stat::default(),
            total_passes: AtomicU64::new(0),
            skipped_passes: AtomicU64::new(0),
            metrics_endpoint_calls: AtomicU64::new(0),
            start_time: Instant::now(),
            last_pass_time: RwLock::new(None),
        }
    }
}

/// Values owned elsewhere that the health table shows.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthContext {
    pub services_loaded: bool,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl HealthStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pass(&self, report: &PassReport, duration_secs: f64) {
        self.total_passes.fetch_add(1, Ordering::Relaxed);
        if !report.services_loaded {
            self.skipped_passes.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.pass_duration_seconds.add_sample(duration_secs);
        self.samples_per_pass.add_sample(report.samples.len() as f64);
        self.errors_per_pass.add_sample(report.errors() as f64);
        if let Ok(mut guard) = self.last_pass_time.write() {
            *guard = Some(Local::now());
        }
    }

    pub fn record_metrics_endpoint_call(&self) {
        self.metrics_endpoint_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_uptime_hours(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() / 3600.0
    }

    pub fn get_last_pass_time_str(&self) -> String {
        match self.last_pass_time.read() {
            Ok(guard) => (*guard)
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            Err(_) => "N/A".to_string(),
        }
    }

    pub fn render_table(&self, context: &HealthContext) -> String {
        let left_col = 26usize;
        let col_w = 12usize;
        let mut out = String::new();

        let row = |out: &mut String, name: &str, stat: &Stat, precision: usize| {
            let (cur, avg, max, min, _) = stat.snapshot();
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                name,
                format!("{:.p$}", cur, p = precision),
                format!("{:.p$}", avg, p = precision.max(1)),
                format!("{:.p$}", max, p = precision),
                format!("{:.p$}", min, p = precision),
                left = left_col,
                col = col_w
            )
            .ok();
        };

        writeln!(out, "HEALTH ENDPOINT - EXPORTER INTERNAL STATS").ok();
        writeln!(out, "==========================================").ok();
        writeln!(out).ok();
        writeln!(
            out,
            "services: {}",
            if context.services_loaded {
                "loaded"
            } else {
                "not loaded (discovery retrying)"
            }
        )
        .ok();
        writeln!(out).ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "COLLECTION PASSES").ok();
        writeln!(out, "------------------").ok();
        row(&mut out, "pass_duration (s)", &self.pass_duration_seconds, 3);
        row(&mut out, "samples", &self.samples_per_pass, 0);
        row(&mut out, "errors", &self.errors_per_pass, 0);

        let total = context.cache_hits + context.cache_misses;
        let hit_ratio = if total == 0 {
            100.0
        } else {
            (context.cache_hits as f64 / total as f64) * 100.0
        };

        writeln!(out).ok();
        writeln!(out, "RESULT CACHE").ok();
        writeln!(out, "-------------").ok();
        writeln!(
            out,
            "served from cache: {} | loaded from device: {} | hit ratio: {:.1}%",
            context.cache_hits, context.cache_misses, hit_ratio
        )
        .ok();

        writeln!(out).ok();
        writeln!(
            out,
            "number of passes: {} (skipped: {}) | /metrics calls: {} | last pass: {} | uptime: {:.1}h",
            self.total_passes.load(Ordering::Relaxed),
            self.skipped_passes.load(Ordering::Relaxed),
            self.metrics_endpoint_calls.load(Ordering::Relaxed),
            self.get_last_pass_time_str(),
            self.get_uptime_hours()
        )
        .ok();

        out
    }
}
