//! One collection pass over the whole catalog.
//!
//! Action metrics are processed first, in catalog order, then page metrics.
//! Each descriptor resolves its call plan, goes through the result cache and
//! hands its rows to the pass-scoped [`Reporter`]. Failures are counted per
//! descriptor (or per indexed call) and never abort the pass.

use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument, warn};

use crate::bootstrap::BootstrapGuard;
use crate::cache::{Namespace, ResultCache};
use crate::catalog::{ActionMetric, MetricCatalog, PageMetric};
use crate::clock::Clock;
use crate::device::{
    Action, CallArgument, FieldMap, JsonPageDecoder, JsonRowExtractor, PageDecoder, PageLoader,
    RowExtractor, ServiceTable,
};
use crate::error::CollectError;
use crate::metrics::EngineMetrics;
use crate::reporter::{Reporter, Sample};
use crate::session::SessionReauthCoordinator;

/// Everything needed to collect page metrics.
pub struct PageSource {
    pub coordinator: SessionReauthCoordinator,
    pub decoder: Box<dyn PageDecoder>,
    pub extractor: Box<dyn RowExtractor>,
}

impl PageSource {
    /// Page source with the JSON decoder and row extractor.
    pub fn new(loader: Arc<dyn PageLoader>) -> Self {
        Self {
            coordinator: SessionReauthCoordinator::new(loader),
            decoder: Box::new(JsonPageDecoder),
            extractor: Box::new(JsonRowExtractor),
        }
    }
}

/// Outcome of one collection pass.
#[derive(Debug, Default, Clone)]
pub struct PassReport {
    pub samples: Vec<Sample>,
    pub action_errors: u64,
    pub page_errors: u64,
    /// False if the pass was skipped because services are not loaded yet.
    pub services_loaded: bool,
}

impl PassReport {
    pub fn errors(&self) -> u64 {
        self.action_errors + self.page_errors
    }
}

struct Caches {
    upnp: ResultCache<FieldMap>,
    lua: ResultCache<Value>,
}

/// Drives collection passes over a fixed catalog.
pub struct CollectionEngine {
    catalog: Arc<MetricCatalog>,
    bootstrap: Arc<BootstrapGuard>,
    pages: Option<PageSource>,
    gateway: String,
    metrics: EngineMetrics,
    caches: Mutex<Caches>,
}

impl CollectionEngine {
    pub fn new(
        catalog: Arc<MetricCatalog>,
        bootstrap: Arc<BootstrapGuard>,
        gateway: impl Into<String>,
        metrics: EngineMetrics,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let caches = Caches {
            upnp: ResultCache::new(
                Namespace::Upnp,
                Arc::clone(&clock),
                metrics.cache_counters(Namespace::Upnp),
            ),
            lua: ResultCache::new(Namespace::Lua, clock, metrics.cache_counters(Namespace::Lua)),
        };

        Self {
            catalog,
            bootstrap,
            pages: None,
            gateway: gateway.into(),
            metrics,
            caches: Mutex::new(caches),
        }
    }

    /// Enables page metrics.
    pub fn with_pages(mut self, pages: PageSource) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    /// Runs one pass. Yields nothing until the service table is loaded.
    #[instrument(skip(self))]
    pub fn collect_pass(&self) -> PassReport {
        let Some(services) = self.bootstrap.services() else {
            debug!("Services not loaded yet, skipping collection");
            return PassReport::default();
        };

        let mut caches = self.caches.lock().unwrap_or_else(|e| e.into_inner());
        let caches = &mut *caches;
        let mut reporter = Reporter::new(&self.gateway);
        let mut report = PassReport {
            services_loaded: true,
            ..PassReport::default()
        };

        for (index, metric) in self.catalog.actions().iter().enumerate() {
            self.collect_action(
                &services,
                &mut caches.upnp,
                &mut reporter,
                index,
                metric,
                &mut report,
            );
        }

        if let Some(source) = &self.pages {
            for (index, metric) in self.catalog.pages().iter().enumerate() {
                self.collect_page(source, &mut caches.lua, &mut reporter, index, metric, &mut report);
            }
        }

        debug!(
            "Collection pass done: {} samples, {} action errors, {} page errors",
            report.samples.len(),
            report.action_errors,
            report.page_errors
        );
        report
    }

    fn collect_action(
        &self,
        services: &ServiceTable,
        cache: &mut ResultCache<FieldMap>,
        reporter: &mut Reporter<'_>,
        index: usize,
        metric: &ActionMetric,
        report: &mut PassReport,
    ) {
        let (action, plan) = match plan_calls(services, cache, metric) {
            Ok(plan) => plan,
            Err(e) => {
                self.action_error(metric, &e, report);
                return;
            }
        };

        let mut call_once = |argument: Option<CallArgument>| {
            let key = call_key(metric, argument.as_ref());
            let result = cache
                .fetch_or_return(&key, metric.ttl_secs, || call(action, argument.as_ref()))
                .and_then(|(row, _)| reporter.report_action(index, metric, &row));

            match result {
                Ok(sample) => report.samples.push(sample),
                Err(e) => self.action_error(metric, &e, report),
            }
        };

        match plan {
            CallPlan::Single(argument) => call_once(argument),
            CallPlan::Indexed { name, count } => {
                for i in 0..count {
                    call_once(Some(CallArgument {
                        name: name.clone(),
                        value: i.to_string(),
                    }));
                }
            }
        }
    }

    fn collect_page(
        &self,
        source: &PageSource,
        cache: &mut ResultCache<Value>,
        reporter: &mut Reporter<'_>,
        index: usize,
        metric: &PageMetric,
        report: &mut PassReport,
    ) {
        let key = metric.page.cache_key();
        let page = cache.fetch_or_return(&key, metric.ttl_secs, || {
            let body = source
                .coordinator
                .load(&metric.page)
                .map_err(|e| CollectError::Fetch(e.to_string()))?;
            source
                .decoder
                .decode(&body)
                .map_err(|e| CollectError::Decode(e.to_string()))
        });
        let page = match page {
            Ok((page, _)) => page,
            Err(e) => {
                self.page_error(metric, &e, report);
                return;
            }
        };

        let rows = match source
            .extractor
            .extract(&page, &metric.definition, self.catalog.renames())
        {
            Ok(rows) => rows,
            Err(e) => {
                cache.invalidate(&key);
                self.page_error(metric, &CollectError::Extract(e.to_string()), report);
                return;
            }
        };

        for row in &rows {
            match reporter.report_page(index, metric, row) {
                Ok(sample) => report.samples.push(sample),
                Err(e) => self.page_error(metric, &e, report),
            }
        }
    }

    fn action_error(&self, metric: &ActionMetric, e: &CollectError, report: &mut PassReport) {
        warn!("{} ({}): {}", metric.display_name(), e.kind(), e);
        self.metrics.collect_errors.inc();
        report.action_errors += 1;
    }

    fn page_error(&self, metric: &PageMetric, e: &CollectError, report: &mut PassReport) {
        warn!("{} {} ({}): {}", metric.page, metric.display_name(), e.kind(), e);
        self.metrics.lua_collect_errors.inc();
        report.page_errors += 1;
    }
}

fn call(action: &Arc<dyn Action>, argument: Option<&CallArgument>) -> Result<FieldMap, CollectError> {
    action
        .call(argument)
        .map_err(|e| CollectError::Fetch(e.to_string()))
}

/// Cache key of one call: `service|action`, plus `|name|value` with an argument.
fn call_key(metric: &ActionMetric, argument: Option<&CallArgument>) -> String {
    match argument {
        Some(arg) => format!("{}|{}|{}|{}", metric.service, metric.action, arg.name, arg.value),
        None => format!("{}|{}", metric.service, metric.action),
    }
}

/// Upper bound for index fan-out; larger counts are treated as garbage.
pub const MAX_INDEX_COUNT: u64 = 4096;

/// How an action metric calls its action within one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CallPlan {
    Single(Option<CallArgument>),
    /// One call per index `0..count`, argument `name` set to the index.
    Indexed { name: String, count: u64 },
}

/// Resolves the action and how it is called.
fn plan_calls<'t>(
    services: &'t ServiceTable,
    cache: &mut ResultCache<FieldMap>,
    metric: &ActionMetric,
) -> Result<(&'t Arc<dyn Action>, CallPlan), CollectError> {
    let action = services.action(&metric.service, &metric.action)?;

    let Some(arg) = &metric.argument else {
        return Ok((action, CallPlan::Single(None)));
    };

    let value = match arg.provider() {
        Some(provider) => {
            let provider_action = services.action(&metric.service, provider)?;
            let key = format!("{}|{}", metric.service, provider);
            let (row, _) =
                cache.fetch_or_return(&key, metric.ttl_secs, || call(provider_action, None))?;
            row.get(&arg.value)
                .map(|v| v.to_string())
                .ok_or_else(|| CollectError::MissingProviderField {
                    provider: provider.to_string(),
                    field: arg.value.clone(),
                })?
        }
        None => arg.value.clone(),
    };

    if !arg.is_index {
        return Ok((
            action,
            CallPlan::Single(Some(CallArgument {
                name: arg.name.clone(),
                value,
            })),
        ));
    }

    let count: u64 = value
        .trim()
        .parse()
        .ok()
        .filter(|n| *n <= MAX_INDEX_COUNT)
        .ok_or_else(|| CollectError::InvalidIndexCount(value.clone()))?;
    debug!("{} fans out over {} indices", metric.display_name(), count);

    Ok((
        action,
        CallPlan::Indexed {
            name: arg.name.clone(),
            count,
        },
    ))
}
