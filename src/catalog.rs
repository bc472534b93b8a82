//! Metric catalog: data-driven descriptors for both metric families.
//!
//! Action metrics map a UPnP service/action result field to a series; page
//! metrics map a value inside a Lua page to one or more series. Descriptors
//! are read from JSON (or YAML) files, validated, and compiled once at
//! startup. Nothing in the catalog changes afterwards.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

use crate::device::{LabelRename, PageRequest, ValueDefinition};
use crate::error::ConfigError;

/// Default lower bound for every descriptor's cache TTL, in seconds.
pub const DEFAULT_MIN_CACHE_TTL: i64 = 30;

/// Output description as written in the catalog files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromDesc {
    #[serde(rename = "fqName")]
    pub fq_name: String,
    #[serde(default)]
    pub help: String,
    #[serde(default, rename = "varLabels")]
    pub var_labels: Vec<String>,
    #[serde(default, rename = "fixedLabels")]
    pub fixed_labels: BTreeMap<String, String>,
}

/// Argument of an action metric.
///
/// With `provider_action` set, `value` names the provider's result field
/// that holds the real argument value. With `is_index` set, the value is a
/// count and the action is called once per index below it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionArgument {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(default, rename = "IsIndex")]
    pub is_index: bool,
    #[serde(default, rename = "ProviderAction")]
    pub provider_action: String,
    #[serde(default, rename = "Value")]
    pub value: String,
}

impl ActionArgument {
    pub fn provider(&self) -> Option<&str> {
        if self.provider_action.is_empty() {
            None
        } else {
            Some(&self.provider_action)
        }
    }
}

/// One action metric entry of the action catalog file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionMetricConfig {
    pub service: String,
    pub action: String,
    #[serde(default, rename = "actionArgument", skip_serializing_if = "Option::is_none")]
    pub action_argument: Option<ActionArgument>,
    pub result: String,
    #[serde(default, rename = "okValue")]
    pub ok_value: String,
    #[serde(rename = "promDesc")]
    pub prom_desc: PromDesc,
    #[serde(default, rename = "promType")]
    pub prom_type: String,
    #[serde(default, rename = "cacheEntryTTL")]
    pub cache_entry_ttl: i64,
}

/// One page metric entry of the page catalog file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMetricConfig {
    pub path: String,
    #[serde(default)]
    pub params: String,
    #[serde(default, rename = "resultPath")]
    pub result_path: String,
    #[serde(rename = "resultKey")]
    pub result_key: String,
    #[serde(default, rename = "okValue")]
    pub ok_value: String,
    #[serde(rename = "promDesc")]
    pub prom_desc: PromDesc,
    #[serde(default, rename = "promType")]
    pub prom_type: String,
    #[serde(default, rename = "cacheEntryTTL")]
    pub cache_entry_ttl: i64,
}

/// Label value rename rule as written in the page catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelRenameConfig {
    #[serde(rename = "matchRegex")]
    pub match_regex: String,
    #[serde(rename = "renameLabel")]
    pub rename_label: String,
}

/// The page catalog file: rename rules plus page metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageCatalogConfig {
    #[serde(default, rename = "labelRenames")]
    pub label_renames: Vec<LabelRenameConfig>,
    #[serde(default)]
    pub metrics: Vec<PageMetricConfig>,
}

/// Prometheus value type of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Counter,
    Gauge,
    Untyped,
}

impl ValueKind {
    pub fn parse(prom_type: &str) -> Option<Self> {
        match prom_type {
            "CounterValue" => Some(ValueKind::Counter),
            "GaugeValue" => Some(ValueKind::Gauge),
            "UntypedValue" | "" => Some(ValueKind::Untyped),
            _ => None,
        }
    }
}

/// Compiled, immutable output descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDescriptor {
    pub fq_name: String,
    pub help: String,
    /// Variable label names as configured, used for row lookups.
    pub var_labels: Vec<String>,
    /// Variable label names as exported (lowercase).
    pub label_names: Vec<String>,
    pub fixed_labels: BTreeMap<String, String>,
    pub kind: ValueKind,
    fixed_label_values: String,
}

impl OutputDescriptor {
    fn compile(desc: &PromDesc, kind: ValueKind) -> Self {
        let fixed_label_values = desc
            .fixed_labels
            .values()
            .map(|v| format!("{v},"))
            .collect::<String>();

        Self {
            fq_name: desc.fq_name.clone(),
            help: desc.help.clone(),
            var_labels: desc.var_labels.clone(),
            label_names: desc.var_labels.iter().map(|l| l.to_lowercase()).collect(),
            fixed_labels: desc.fixed_labels.clone(),
            kind,
            fixed_label_values,
        }
    }

    /// Identity of one series of this descriptor within a pass.
    pub fn series_key(&self, label_values: &[String]) -> String {
        format!(
            "{}:{}{}",
            self.fq_name,
            self.fixed_label_values,
            label_values.join(",")
        )
    }

    /// Key identifying the registered metric vector this descriptor feeds.
    pub fn family_key(&self) -> String {
        format!("{}|{}", self.fq_name, self.fixed_label_values)
    }
}

/// A compiled action metric.
#[derive(Debug, Clone)]
pub struct ActionMetric {
    pub service: String,
    pub action: String,
    pub argument: Option<ActionArgument>,
    pub result: String,
    pub ok_value: String,
    pub output: OutputDescriptor,
    pub ttl_secs: i64,
}

impl ActionMetric {
    /// Name used in log lines, `service.action`.
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.service, self.action)
    }
}

/// A compiled page metric.
#[derive(Debug, Clone)]
pub struct PageMetric {
    pub page: PageRequest,
    pub definition: ValueDefinition,
    pub output: OutputDescriptor,
    pub ttl_secs: i64,
}

impl PageMetric {
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.definition.path, self.definition.key)
    }
}

/// All metric descriptors of the process.
#[derive(Debug, Clone, Default)]
pub struct MetricCatalog {
    actions: Vec<ActionMetric>,
    pages: Vec<PageMetric>,
    renames: Vec<LabelRename>,
    ttl_floor: i64,
}

impl MetricCatalog {
    /// Validates and compiles raw descriptors. TTLs below `ttl_floor` are
    /// raised to it.
    pub fn build(
        actions: Vec<ActionMetricConfig>,
        pages: Option<PageCatalogConfig>,
        ttl_floor: i64,
    ) -> Result<Self, ConfigError> {
        let mut compiled_actions = Vec::with_capacity(actions.len());
        for (index, m) in actions.into_iter().enumerate() {
            compiled_actions.push(compile_action(index, m, ttl_floor)?);
        }

        let mut compiled_pages = Vec::new();
        let mut renames = Vec::new();
        if let Some(pages) = pages {
            for r in pages.label_renames {
                let pattern =
                    Regex::new(&r.match_regex).map_err(|source| ConfigError::InvalidRenamePattern {
                        pattern: r.match_regex.clone(),
                        source,
                    })?;
                renames.push(LabelRename {
                    pattern,
                    name: r.rename_label,
                });
            }
            for (index, m) in pages.metrics.into_iter().enumerate() {
                compiled_pages.push(compile_page(index, m, ttl_floor)?);
            }
        }

        debug!(
            "Catalog compiled: {} action metrics, {} page metrics, {} label renames",
            compiled_actions.len(),
            compiled_pages.len(),
            renames.len()
        );

        Ok(Self {
            actions: compiled_actions,
            pages: compiled_pages,
            renames,
            ttl_floor,
        })
    }

    /// Loads the action catalog and, if given, the page catalog from disk.
    pub fn load(
        action_file: &Path,
        page_file: Option<&Path>,
        ttl_floor: i64,
    ) -> Result<Self, ConfigError> {
        let actions: Vec<ActionMetricConfig> = read_catalog_file(action_file)?;
        info!(
            "Loaded {} action metrics from: {}",
            actions.len(),
            action_file.display()
        );

        let pages = match page_file {
            Some(path) => {
                let pages: PageCatalogConfig = read_catalog_file(path)?;
                info!(
                    "Loaded {} page metrics from: {}",
                    pages.metrics.len(),
                    path.display()
                );
                Some(pages)
            }
            None => None,
        };

        Self::build(actions, pages, ttl_floor)
    }

    pub fn actions(&self) -> &[ActionMetric] {
        &self.actions
    }

    pub fn pages(&self) -> &[PageMetric] {
        &self.pages
    }

    pub fn renames(&self) -> &[LabelRename] {
        &self.renames
    }

    pub fn ttl_floor(&self) -> i64 {
        self.ttl_floor
    }
}

/// Reads a catalog file; `.yaml`/`.yml` are parsed as YAML, anything else
/// as JSON.
pub fn read_catalog_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let parsed = match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
        _ => serde_json::from_str(&content).map_err(|e| e.to_string()),
    };

    parsed.map_err(|message| ConfigError::Parse {
        path: path.display().to_string(),
        message,
    })
}

fn invalid(index: usize, name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidDescriptor {
        index,
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn compile_output(
    index: usize,
    name: &str,
    desc: &PromDesc,
    prom_type: &str,
) -> Result<OutputDescriptor, ConfigError> {
    if desc.fq_name.is_empty() {
        return Err(invalid(index, name, "promDesc.fqName is empty"));
    }

    let kind = ValueKind::parse(prom_type)
        .ok_or_else(|| invalid(index, name, format!("unknown promType '{prom_type}'")))?;

    let mut seen = HashSet::new();
    for label in &desc.var_labels {
        if !seen.insert(label.to_lowercase()) {
            return Err(invalid(
                index,
                name,
                format!("duplicate variable label '{label}'"),
            ));
        }
    }

    Ok(OutputDescriptor::compile(desc, kind))
}

fn compile_action(
    index: usize,
    m: ActionMetricConfig,
    ttl_floor: i64,
) -> Result<ActionMetric, ConfigError> {
    let name = format!("{}.{}", m.service, m.action);

    if m.service.is_empty() || m.action.is_empty() {
        return Err(invalid(index, &name, "service and action must be set"));
    }
    if m.result.is_empty() {
        return Err(invalid(index, &name, "result must be set"));
    }
    if let Some(arg) = &m.action_argument {
        if arg.name.is_empty() {
            return Err(invalid(index, &name, "actionArgument.Name is empty"));
        }
    }

    let output = compile_output(index, &name, &m.prom_desc, &m.prom_type)?;

    Ok(ActionMetric {
        service: m.service,
        action: m.action,
        argument: m.action_argument,
        result: m.result,
        ok_value: m.ok_value,
        output,
        ttl_secs: m.cache_entry_ttl.max(ttl_floor),
    })
}

fn compile_page(index: usize, m: PageMetricConfig, ttl_floor: i64) -> Result<PageMetric, ConfigError> {
    let name = format!("{}.{}", m.result_path, m.result_key);

    if m.path.is_empty() {
        return Err(invalid(index, &name, "path must be set"));
    }
    if m.result_key.is_empty() {
        return Err(invalid(index, &name, "resultKey must be set"));
    }

    let output = compile_output(index, &name, &m.prom_desc, &m.prom_type)?;

    Ok(PageMetric {
        page: PageRequest::new(m.path, m.params),
        definition: ValueDefinition {
            path: m.result_path,
            key: m.result_key,
            ok_value: m.ok_value,
            labels: m.prom_desc.var_labels.clone(),
        },
        output,
        ttl_secs: m.cache_entry_ttl.max(ttl_floor),
    })
}
