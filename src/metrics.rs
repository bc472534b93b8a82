//! Prometheus metrics for fritzbox-exporter.
//!
//! `EngineMetrics` holds the exporter's own self-observation metrics.
//! `SeriesExporter` owns one metric vector per catalog output and writes the
//! samples of a collection pass into them.

use ahash::AHashMap as HashMap;
use prometheus::{
    CounterVec, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use tracing::warn;

use crate::cache::{CacheCounters, Namespace};
use crate::catalog::{MetricCatalog, OutputDescriptor, ValueKind};
use crate::error::ConfigError;
use crate::reporter::{Sample, SampleSource};

/// Self-observation metrics of the collection engine.
#[derive(Clone)]
pub struct EngineMetrics {
    pub collect_errors: IntCounter,
    pub lua_collect_errors: IntCounter,
    pub results_cached: IntCounterVec, // labels: cache
    pub results_loaded: IntCounterVec, // labels: cache
    pub scrape_duration_seconds: Gauge,
    pub services_loaded: IntGauge,
}

impl EngineMetrics {
    /// Creates and registers the engine metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, ConfigError> {
        let collect_errors = IntCounter::new(
            "fritzbox_exporter_collect_errors",
            "Number of collection errors for UPnP action metrics",
        )
        .map_err(registration("fritzbox_exporter_collect_errors"))?;
        let lua_collect_errors = IntCounter::new(
            "fritzbox_exporter_lua_collect_errors",
            "Number of collection errors for Lua page metrics",
        )
        .map_err(registration("fritzbox_exporter_lua_collect_errors"))?;
        let results_cached = IntCounterVec::new(
            Opts::new(
                "fritzbox_exporter_results_cached",
                "Number of results served from the cache",
            ),
            &["cache"],
        )
        .map_err(registration("fritzbox_exporter_results_cached"))?;
        let results_loaded = IntCounterVec::new(
            Opts::new(
                "fritzbox_exporter_results_loaded",
                "Number of results freshly loaded from the device",
            ),
            &["cache"],
        )
        .map_err(registration("fritzbox_exporter_results_loaded"))?;
        let scrape_duration_seconds = Gauge::new(
            "fritzbox_exporter_scrape_duration_seconds",
            "Duration of the last collection pass in seconds",
        )
        .map_err(registration("fritzbox_exporter_scrape_duration_seconds"))?;
        let services_loaded = IntGauge::new(
            "fritzbox_exporter_services_loaded",
            "1 once the device service description has been loaded",
        )
        .map_err(registration("fritzbox_exporter_services_loaded"))?;

        let reg = |name: &str, collector: Box<dyn prometheus::core::Collector>| {
            registry.register(collector).map_err(registration(name))
        };
        reg("fritzbox_exporter_collect_errors", Box::new(collect_errors.clone()))?;
        reg(
            "fritzbox_exporter_lua_collect_errors",
            Box::new(lua_collect_errors.clone()),
        )?;
        reg("fritzbox_exporter_results_cached", Box::new(results_cached.clone()))?;
        reg("fritzbox_exporter_results_loaded", Box::new(results_loaded.clone()))?;
        reg(
            "fritzbox_exporter_scrape_duration_seconds",
            Box::new(scrape_duration_seconds.clone()),
        )?;
        reg(
            "fritzbox_exporter_services_loaded",
            Box::new(services_loaded.clone()),
        )?;

        Ok(Self {
            collect_errors,
            lua_collect_errors,
            results_cached,
            results_loaded,
            scrape_duration_seconds,
            services_loaded,
        })
    }

    /// Hit/miss counter pair for one cache namespace.
    pub fn cache_counters(&self, namespace: Namespace) -> CacheCounters {
        CacheCounters {
            cached: self.results_cached.with_label_values(&[namespace.as_str()]),
            loaded: self.results_loaded.with_label_values(&[namespace.as_str()]),
        }
    }
}

fn registration(name: &str) -> impl Fn(prometheus::Error) -> ConfigError + '_ {
    move |source| ConfigError::Registration {
        name: name.to_string(),
        source,
    }
}

#[derive(Clone)]
enum SeriesVec {
    Counter(CounterVec),
    Gauge(GaugeVec),
}

impl SeriesVec {
    fn reset(&self) {
        match self {
            SeriesVec::Counter(v) => v.reset(),
            SeriesVec::Gauge(v) => v.reset(),
        }
    }
}

/// One registered vector and the shape every descriptor feeding it must share.
struct Family {
    kind: ValueKind,
    help: String,
    label_names: Vec<String>,
    vec: SeriesVec,
}

/// Writes pass samples into registered metric vectors.
///
/// Descriptors sharing a name and fixed label values feed the same vector and
/// must agree on kind, help and variable labels. Every pass starts from empty
/// vectors, so series that were not reported in the latest pass disappear
/// from the exposition.
pub struct SeriesExporter {
    families: Vec<Family>,
    action_vecs: Vec<usize>,
    page_vecs: Vec<usize>,
}

impl SeriesExporter {
    pub fn new(registry: &Registry, catalog: &MetricCatalog) -> Result<Self, ConfigError> {
        let mut exporter = Self {
            families: Vec::new(),
            action_vecs: Vec::with_capacity(catalog.actions().len()),
            page_vecs: Vec::with_capacity(catalog.pages().len()),
        };
        let mut slots: HashMap<String, usize> = HashMap::new();

        for m in catalog.actions() {
            let slot = exporter.family_slot(registry, &mut slots, &m.output)?;
            exporter.action_vecs.push(slot);
        }
        for m in catalog.pages() {
            let slot = exporter.family_slot(registry, &mut slots, &m.output)?;
            exporter.page_vecs.push(slot);
        }

        Ok(exporter)
    }

    fn family_slot(
        &mut self,
        registry: &Registry,
        slots: &mut HashMap<String, usize>,
        output: &OutputDescriptor,
    ) -> Result<usize, ConfigError> {
        let help = if output.help.is_empty() {
            output.fq_name.clone()
        } else {
            output.help.clone()
        };

        let key = output.family_key();
        if let Some(&slot) = slots.get(&key) {
            let family = &self.families[slot];
            let conflict = if family.kind != output.kind {
                Some(format!(
                    "declared as both {:?} and {:?}",
                    family.kind, output.kind
                ))
            } else if family.label_names != output.label_names {
                Some(format!(
                    "declared with labels {:?} and {:?}",
                    family.label_names, output.label_names
                ))
            } else if family.help != help {
                Some(format!(
                    "declared with help '{}' and '{}'",
                    family.help, help
                ))
            } else {
                None
            };

            return match conflict {
                Some(message) => Err(ConfigError::Registration {
                    name: output.fq_name.clone(),
                    source: prometheus::Error::Msg(message),
                }),
                None => Ok(slot),
            };
        }

        let opts = Opts::new(output.fq_name.clone(), help.clone())
            .const_labels(output.fixed_labels.clone().into_iter().collect());
        let labels: Vec<&str> = output.label_names.iter().map(String::as_str).collect();
        let err = registration(&output.fq_name);

        let vec = match output.kind {
            ValueKind::Counter => {
                let v = CounterVec::new(opts, &labels).map_err(&err)?;
                registry.register(Box::new(v.clone())).map_err(&err)?;
                SeriesVec::Counter(v)
            }
            ValueKind::Gauge | ValueKind::Untyped => {
                let v = GaugeVec::new(opts, &labels).map_err(&err)?;
                registry.register(Box::new(v.clone())).map_err(&err)?;
                SeriesVec::Gauge(v)
            }
        };

        self.families.push(Family {
            kind: output.kind,
            help,
            label_names: output.label_names.clone(),
            vec,
        });
        let slot = self.families.len() - 1;
        slots.insert(key, slot);
        Ok(slot)
    }

    /// Number of registered metric vectors.
    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    fn record(&self, sample: &Sample) {
        let slot = match sample.source {
            SampleSource::Action(i) => self.action_vecs.get(i),
            SampleSource::Page(i) => self.page_vecs.get(i),
        };
        let Some(&slot) = slot else {
            warn!("Sample for unknown descriptor {:?} dropped", sample.source);
            return;
        };

        let values: Vec<&str> = sample.labels.iter().map(String::as_str).collect();
        let written = match &self.families[slot].vec {
            SeriesVec::Counter(v) => {
                if sample.value < 0.0 {
                    warn!(
                        "Negative counter value {} for {:?} dropped",
                        sample.value, sample.source
                    );
                    return;
                }
                v.get_metric_with_label_values(&values).map(|counter| {
                    counter.reset();
                    counter.inc_by(sample.value);
                })
            }
            SeriesVec::Gauge(v) => v
                .get_metric_with_label_values(&values)
                .map(|gauge| gauge.set(sample.value)),
        };

        if let Err(e) = written {
            warn!("Sample for {:?} dropped: {}", sample.source, e);
        }
    }

    /// Replaces the exported series with the samples of one pass.
    pub fn publish(&self, samples: &[Sample]) {
        for family in &self.families {
            family.vec.reset();
        }
        for sample in samples {
            self.record(sample);
        }
    }
}
