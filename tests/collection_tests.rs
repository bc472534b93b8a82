//! Integration tests for collection passes.
//!
//! These tests drive the engine against recorded device snapshots and
//! verify caching, argument fan-out, duplicate handling and the Lua
//! session re-authentication behaviour.

use fritzbox_exporter::catalog::{ActionMetricConfig, PageCatalogConfig};
use fritzbox_exporter::device::{PageLoader, PageRequest, ServiceTable, SessionCredential};
use fritzbox_exporter::{
    BootstrapGuard, CollectionEngine, DeviceError, EngineMetrics, ManualClock, MetricCatalog,
    Namespace, PageSource, SampleSource, SeriesExporter, SnapshotDevice,
};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SNAPSHOT: &str = r#"{
    "services": {
        "urn:dslforum-org:service:Hosts:1": {
            "controlUrl": "/upnp/control/hosts",
            "actions": {
                "GetHostNumberOfEntries": { "response": { "NewHostNumberOfEntries": 3 } },
                "GetGenericHostEntry": {
                    "inputs": ["NewIndex"],
                    "responses": {
                        "0": { "HostName": "NAS", "NewActive": true },
                        "1": { "HostName": "TV", "NewActive": false },
                        "2": { "HostName": "Laptop", "NewActive": true }
                    }
                },
                "GetSpecificHostEntry": {
                    "inputs": ["NewMACAddress"],
                    "responses": {
                        "AA:BB:CC:DD:EE:FF": {
                            "NewActive": true,
                            "MACAddress": "AA:BB:CC:DD:EE:FF",
                            "HostName": "NAS"
                        }
                    }
                },
                "X_AVM-DE_GetDefaultHost": { "response": { "NewDefaultMAC": "AA:BB:CC:DD:EE:FF" } },
                "X_AVM-DE_GetHostCount": { "response": { "NewCount": "18446744073709551615" } }
            }
        },
        "urn:dslforum-org:service:WLANConfiguration:1": {
            "actions": {
                "GetTotalAssociations": { "response": { "NewTotalAssociations": 0 } },
                "GetInfo": { "response": { "NewStatus": "Up", "NewChannel": 6 } }
            }
        }
    },
    "pages": {
        "data.lua?page=ecoStat": { "data": { "cputemp": { "series": [55] }, "load": "12 %" } }
    }
}"#;

fn action_metrics(json: &str) -> Vec<ActionMetricConfig> {
    serde_json::from_str(json).unwrap()
}

fn page_metrics(json: &str) -> PageCatalogConfig {
    serde_json::from_str(json).unwrap()
}

fn engine_with(
    catalog: MetricCatalog,
    clock: Arc<ManualClock>,
    table: ServiceTable,
    pages: Option<PageSource>,
) -> (CollectionEngine, Registry) {
    let registry = Registry::new();
    let metrics = EngineMetrics::new(&registry).unwrap();
    let bootstrap = Arc::new(BootstrapGuard::new());
    assert!(bootstrap.install(table));

    let mut engine =
        CollectionEngine::new(Arc::new(catalog), bootstrap, "fritz.box", metrics, clock);
    if let Some(pages) = pages {
        engine = engine.with_pages(pages);
    }
    (engine, registry)
}

fn snapshot_engine(
    actions: &str,
    pages: Option<&str>,
    clock: Arc<ManualClock>,
) -> (CollectionEngine, Registry, Arc<SnapshotDevice>) {
    use fritzbox_exporter::device::ServiceDiscovery;

    let device = Arc::new(SnapshotDevice::from_json_str(SNAPSHOT).unwrap());
    let catalog = MetricCatalog::build(action_metrics(actions), pages.map(page_metrics), 30).unwrap();
    let source = pages.map(|_| PageSource::new(device.clone()));
    let (engine, registry) = engine_with(catalog, clock, device.discover().unwrap(), source);
    (engine, registry, device)
}

const HOST_ACTIVE: &str = r#"[{
    "service": "urn:dslforum-org:service:Hosts:1",
    "action": "GetGenericHostEntry",
    "actionArgument": {
        "Name": "NewIndex",
        "IsIndex": true,
        "ProviderAction": "GetHostNumberOfEntries",
        "Value": "NewHostNumberOfEntries"
    },
    "result": "NewActive",
    "promDesc": {
        "fqName": "gateway_host_active",
        "help": "is host currently active",
        "varLabels": ["gateway", "HostName"]
    },
    "promType": "GaugeValue"
}]"#;

#[test]
fn test_index_fan_out_through_snapshot() {
    let clock = Arc::new(ManualClock::new(1_000));
    let (engine, _registry, _device) = snapshot_engine(HOST_ACTIVE, None, clock);

    let report = engine.collect_pass();
    assert!(report.services_loaded);
    assert_eq!(report.errors(), 0);

    let mut hosts: Vec<(String, f64)> = report
        .samples
        .iter()
        .map(|s| (s.labels[1].clone(), s.value))
        .collect();
    hosts.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        hosts,
        vec![
            ("laptop".to_string(), 1.0),
            ("nas".to_string(), 1.0),
            ("tv".to_string(), 0.0)
        ]
    );
    assert!(report.samples.iter().all(|s| s.labels[0] == "fritz.box"));

    // Provider plus three indexed calls
    let upnp = engine.metrics().cache_counters(Namespace::Upnp);
    assert_eq!(upnp.loaded.get(), 4);
    assert_eq!(upnp.cached.get(), 0);

    let second = engine.collect_pass();
    assert_eq!(second.samples.len(), 3);
    assert_eq!(upnp.loaded.get(), 4);
    assert_eq!(upnp.cached.get(), 4);
}

fn specific_host(argument: &str) -> String {
    format!(
        r#"[{{
            "service": "urn:dslforum-org:service:Hosts:1",
            "action": "GetSpecificHostEntry",
            "actionArgument": {argument},
            "result": "NewActive",
            "promDesc": {{
                "fqName": "gateway_host_active",
                "varLabels": ["gateway", "MACAddress", "HostName"]
            }},
            "promType": "GaugeValue"
        }}]"#
    )
}

#[test]
fn test_literal_argument() {
    let actions = specific_host(r#"{ "Name": "NewMACAddress", "Value": "AA:BB:CC:DD:EE:FF" }"#);
    let clock = Arc::new(ManualClock::new(1_000));
    let (engine, _registry, _device) = snapshot_engine(&actions, None, clock);

    let report = engine.collect_pass();
    assert_eq!(report.errors(), 0);
    assert_eq!(report.samples.len(), 1);
    assert_eq!(
        report.samples[0].labels,
        vec!["fritz.box", "aa:bb:cc:dd:ee:ff", "nas"]
    );
    assert_eq!(report.samples[0].value, 1.0);

    let upnp = engine.metrics().cache_counters(Namespace::Upnp);
    assert_eq!(upnp.loaded.get(), 1);
    engine.collect_pass();
    assert_eq!(upnp.loaded.get(), 1);
    assert_eq!(upnp.cached.get(), 1);
}

#[test]
fn test_provider_argument() {
    let actions = specific_host(
        r#"{ "Name": "NewMACAddress", "ProviderAction": "X_AVM-DE_GetDefaultHost", "Value": "NewDefaultMAC" }"#,
    );
    let clock = Arc::new(ManualClock::new(1_000));
    let (engine, _registry, _device) = snapshot_engine(&actions, None, clock);

    let report = engine.collect_pass();
    assert_eq!(report.errors(), 0);
    assert_eq!(report.samples.len(), 1);
    assert_eq!(report.samples[0].labels[1], "aa:bb:cc:dd:ee:ff");

    // provider result plus the entry itself
    let upnp = engine.metrics().cache_counters(Namespace::Upnp);
    assert_eq!(upnp.loaded.get(), 2);
}

#[test]
fn test_missing_provider_field() {
    let actions = specific_host(
        r#"{ "Name": "NewMACAddress", "ProviderAction": "X_AVM-DE_GetDefaultHost", "Value": "NewNoSuchField" }"#,
    );
    let clock = Arc::new(ManualClock::new(1_000));
    let (engine, _registry, _device) = snapshot_engine(&actions, None, clock);

    let report = engine.collect_pass();
    assert!(report.samples.is_empty());
    assert_eq!(report.action_errors, 1);
    assert_eq!(engine.metrics().collect_errors.get(), 1);
    // only the provider was called
    assert_eq!(engine.metrics().cache_counters(Namespace::Upnp).loaded.get(), 1);
}

#[test]
fn test_huge_index_count_is_isolated() {
    let actions = r#"[
        {
            "service": "urn:dslforum-org:service:Hosts:1",
            "action": "GetGenericHostEntry",
            "actionArgument": {
                "Name": "NewIndex",
                "IsIndex": true,
                "ProviderAction": "X_AVM-DE_GetHostCount",
                "Value": "NewCount"
            },
            "result": "NewActive",
            "promDesc": { "fqName": "gateway_host_active", "varLabels": ["HostName"] },
            "promType": "GaugeValue"
        },
        {
            "service": "urn:dslforum-org:service:WLANConfiguration:1",
            "action": "GetInfo",
            "result": "NewChannel",
            "promDesc": { "fqName": "gateway_wlan_channel" },
            "promType": "GaugeValue"
        }
    ]"#;
    let clock = Arc::new(ManualClock::new(1_000));
    let (engine, _registry, _device) = snapshot_engine(actions, None, clock);

    let report = engine.collect_pass();
    assert_eq!(report.action_errors, 1);
    assert_eq!(report.samples.len(), 1);
    assert_eq!(report.samples[0].source, SampleSource::Action(1));
    assert_eq!(report.samples[0].value, 6.0);
}

#[test]
fn test_zero_index_count_yields_nothing() {
    let actions = r#"[{
        "service": "urn:dslforum-org:service:WLANConfiguration:1",
        "action": "GetInfo",
        "actionArgument": {
            "Name": "NewAssociatedDeviceIndex",
            "IsIndex": true,
            "ProviderAction": "GetTotalAssociations",
            "Value": "NewTotalAssociations"
        },
        "result": "NewChannel",
        "promDesc": { "fqName": "gateway_wlan_channel" },
        "promType": "GaugeValue"
    }]"#;
    let clock = Arc::new(ManualClock::new(1_000));
    let (engine, _registry, _device) = snapshot_engine(actions, None, clock);

    let report = engine.collect_pass();
    assert!(report.samples.is_empty());
    assert_eq!(report.errors(), 0);
    assert_eq!(engine.metrics().collect_errors.get(), 0);
}

#[test]
fn test_short_ttl_raised_to_floor() {
    let actions = r#"[{
        "service": "urn:dslforum-org:service:WLANConfiguration:1",
        "action": "GetInfo",
        "result": "NewChannel",
        "promDesc": { "fqName": "gateway_wlan_channel" },
        "promType": "GaugeValue",
        "cacheEntryTTL": 5
    }]"#;
    let clock = Arc::new(ManualClock::new(1_000));
    let (engine, _registry, _device) = snapshot_engine(actions, None, clock.clone());
    assert_eq!(engine.catalog().actions()[0].ttl_secs, 30);

    let upnp = engine.metrics().cache_counters(Namespace::Upnp);
    engine.collect_pass();
    assert_eq!(upnp.loaded.get(), 1);

    clock.advance(10);
    engine.collect_pass();
    assert_eq!(upnp.loaded.get(), 1);
    assert_eq!(upnp.cached.get(), 1);

    clock.advance(21);
    engine.collect_pass();
    assert_eq!(upnp.loaded.get(), 2);
}

#[test]
fn test_duplicate_series_dropped_per_pass_only() {
    let actions = r#"[
        {
            "service": "urn:dslforum-org:service:WLANConfiguration:1",
            "action": "GetInfo",
            "result": "NewStatus",
            "okValue": "Up",
            "promDesc": { "fqName": "gateway_wlan_status", "varLabels": ["gateway"] },
            "promType": "GaugeValue"
        },
        {
            "service": "urn:dslforum-org:service:WLANConfiguration:1",
            "action": "GetInfo",
            "result": "NewStatus",
            "okValue": "Up",
            "promDesc": { "fqName": "gateway_wlan_status", "varLabels": ["gateway"] },
            "promType": "GaugeValue"
        }
    ]"#;
    let clock = Arc::new(ManualClock::new(1_000));
    let (engine, _registry, _device) = snapshot_engine(actions, None, clock);

    for _ in 0..2 {
        let report = engine.collect_pass();
        assert_eq!(report.samples.len(), 1);
        assert_eq!(report.samples[0].source, SampleSource::Action(0));
        assert_eq!(report.samples[0].value, 1.0);
        assert_eq!(report.action_errors, 1);
    }
    assert_eq!(engine.metrics().collect_errors.get(), 2);
}

const ECO_PAGES: &str = r#"{
    "metrics": [
        {
            "path": "data.lua",
            "params": "page=ecoStat",
            "resultPath": "data.cputemp.series",
            "resultKey": "0",
            "promDesc": { "fqName": "gateway_data_ecostat_cputemp", "varLabels": ["gateway"] },
            "promType": "GaugeValue"
        },
        {
            "path": "data.lua",
            "params": "page=missing",
            "resultPath": "data",
            "resultKey": "value",
            "promDesc": { "fqName": "gateway_data_missing" },
            "promType": "GaugeValue"
        }
    ]
}"#;

#[test]
fn test_failed_page_load_forces_login() {
    let clock = Arc::new(ManualClock::new(1_000));
    let (engine, _registry, device) = snapshot_engine("[]", Some(ECO_PAGES), clock);

    let report = engine.collect_pass();
    assert_eq!(report.samples.len(), 1);
    assert_eq!(report.samples[0].value, 55.0);
    assert_eq!(report.page_errors, 1);
    assert_eq!(device.login_count(), 1);
    assert!(!device.session().is_set());

    // ecoStat is served from cache, the missing page logs in again
    let report = engine.collect_pass();
    assert_eq!(report.samples.len(), 1);
    assert_eq!(device.login_count(), 2);
    assert_eq!(engine.metrics().lua_collect_errors.get(), 2);
}

#[test]
fn test_actions_before_pages_and_shared_dedup() {
    let actions = r#"[{
        "service": "urn:dslforum-org:service:WLANConfiguration:1",
        "action": "GetInfo",
        "result": "NewChannel",
        "promDesc": { "fqName": "gateway_shared_value", "varLabels": ["gateway"] },
        "promType": "GaugeValue"
    }]"#;
    let pages = r#"{
        "metrics": [
            {
                "path": "data.lua",
                "params": "page=ecoStat",
                "resultPath": "data.cputemp.series",
                "resultKey": "0",
                "promDesc": { "fqName": "gateway_data_ecostat_cputemp", "varLabels": ["gateway"] },
                "promType": "GaugeValue"
            },
            {
                "path": "data.lua",
                "params": "page=ecoStat",
                "resultPath": "data.cputemp.series",
                "resultKey": "0",
                "promDesc": { "fqName": "gateway_shared_value", "varLabels": ["gateway"] },
                "promType": "GaugeValue"
            }
        ]
    }"#;
    let clock = Arc::new(ManualClock::new(1_000));
    let (engine, _registry, _device) = snapshot_engine(actions, Some(pages), clock);

    let report = engine.collect_pass();
    let sources: Vec<SampleSource> = report.samples.iter().map(|s| s.source).collect();
    assert_eq!(sources, vec![SampleSource::Action(0), SampleSource::Page(0)]);
    assert_eq!(report.samples[0].value, 6.0);

    // the page series collides with the action series emitted earlier
    assert_eq!(report.action_errors, 0);
    assert_eq!(report.page_errors, 1);
    assert_eq!(engine.metrics().lua_collect_errors.get(), 1);
    assert_eq!(engine.metrics().collect_errors.get(), 0);
}

/// Loader returning a fixed body and counting loads.
struct FixedLoader {
    body: Vec<u8>,
    loads: AtomicUsize,
    session: SessionCredential,
}

impl FixedLoader {
    fn new(body: &str) -> Arc<Self> {
        let session = SessionCredential::new();
        session.set("0000000000000001");
        Arc::new(Self {
            body: body.as_bytes().to_vec(),
            loads: AtomicUsize::new(0),
            session,
        })
    }
}

impl PageLoader for FixedLoader {
    fn load(&self, _page: &PageRequest) -> Result<Vec<u8>, DeviceError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(self.body.clone())
    }

    fn session(&self) -> &SessionCredential {
        &self.session
    }
}

const TEMP_PAGE: &str = r#"{
    "metrics": [{
        "path": "data.lua",
        "params": "page=ecoStat",
        "resultPath": "data",
        "resultKey": "cputemp",
        "promDesc": { "fqName": "gateway_data_ecostat_cputemp" },
        "promType": "GaugeValue"
    }]
}"#;

fn loader_engine(loader: Arc<FixedLoader>, clock: Arc<ManualClock>) -> CollectionEngine {
    let catalog = MetricCatalog::build(Vec::new(), Some(page_metrics(TEMP_PAGE)), 30).unwrap();
    let (engine, _registry) = engine_with(
        catalog,
        clock,
        ServiceTable::default(),
        Some(PageSource::new(loader)),
    );
    engine
}

#[test]
fn test_decode_error_keeps_session() {
    let loader = FixedLoader::new("<html>login</html>");
    let engine = loader_engine(loader.clone(), Arc::new(ManualClock::new(1_000)));

    let report = engine.collect_pass();
    assert!(report.samples.is_empty());
    assert_eq!(report.page_errors, 1);
    assert!(loader.session.is_set());

    // Failed decodes are not cached
    engine.collect_pass();
    assert_eq!(loader.loads.load(Ordering::Relaxed), 2);
}

#[test]
fn test_extract_error_invalidates_cached_page() {
    let loader = FixedLoader::new(r#"{"data": {"other": 1}}"#);
    let engine = loader_engine(loader.clone(), Arc::new(ManualClock::new(1_000)));

    let report = engine.collect_pass();
    assert_eq!(report.page_errors, 1);
    assert_eq!(loader.loads.load(Ordering::Relaxed), 1);

    let report = engine.collect_pass();
    assert_eq!(report.page_errors, 1);
    assert_eq!(loader.loads.load(Ordering::Relaxed), 2);
    assert!(loader.session.is_set());
}

#[test]
fn test_extract_success_is_cached() {
    let loader = FixedLoader::new(r#"{"data": {"cputemp": "61"}}"#);
    let engine = loader_engine(loader.clone(), Arc::new(ManualClock::new(1_000)));

    for _ in 0..3 {
        let report = engine.collect_pass();
        assert_eq!(report.samples.len(), 1);
        assert_eq!(report.samples[0].value, 61.0);
    }
    assert_eq!(loader.loads.load(Ordering::Relaxed), 1);
    assert_eq!(engine.metrics().cache_counters(Namespace::Lua).cached.get(), 2);
}

#[test]
fn test_published_exposition() {
    let clock = Arc::new(ManualClock::new(1_000));
    let device = Arc::new(SnapshotDevice::from_json_str(SNAPSHOT).unwrap());
    let catalog = MetricCatalog::build(action_metrics(HOST_ACTIVE), None, 30).unwrap();

    let registry = Registry::new();
    let exporter = SeriesExporter::new(&registry, &catalog).unwrap();
    let bootstrap = Arc::new(BootstrapGuard::new());
    bootstrap.try_load(device.as_ref()).unwrap();
    let engine = CollectionEngine::new(
        Arc::new(catalog),
        bootstrap,
        "fritz.box",
        EngineMetrics::new(&registry).unwrap(),
        clock,
    );

    let report = engine.collect_pass();
    exporter.publish(&report.samples);

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .unwrap();
    let text = String::from_utf8(buffer).unwrap();

    assert!(text.contains("# HELP gateway_host_active is host currently active"));
    assert!(text.contains("# TYPE gateway_host_active gauge"));
    assert!(text.contains(r#"gateway_host_active{gateway="fritz.box",hostname="nas"} 1"#));
    assert!(text.contains(r#"gateway_host_active{gateway="fritz.box",hostname="tv"} 0"#));
    assert!(text.contains("fritzbox_exporter_results_loaded"));
}
