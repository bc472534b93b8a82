//! Turns raw result rows into samples.
//!
//! The reporter coerces raw values to floats, resolves variable labels in
//! declared order and refuses to emit the same series twice within a pass.
//! A duplicate would otherwise make the whole scrape invalid.

use ahash::AHashSet as HashSet;
use tracing::debug;

use crate::catalog::{ActionMetric, OutputDescriptor, PageMetric};
use crate::device::{FieldMap, FieldValue, PageRow};
use crate::error::CollectError;

/// Label name replaced by the configured device host.
pub const GATEWAY_LABEL: &str = "gateway";

/// Labels carrying host names or hardware addresses; their values are
/// exported lowercase.
const LOWERCASE_LABELS: [&str; 2] = ["HostName", "MACAddress"];

/// Descriptor a sample belongs to, as an index into the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSource {
    Action(usize),
    Page(usize),
}

/// One resolved series value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub source: SampleSource,
    /// Variable label values, in descriptor order.
    pub labels: Vec<String>,
    pub value: f64,
}

/// Anything a label value can be looked up in.
pub trait LabelSource {
    fn label_value(&self, name: &str) -> Option<String>;
}

impl LabelSource for FieldMap {
    fn label_value(&self, name: &str) -> Option<String> {
        self.get(name).map(|v| v.to_string())
    }
}

impl LabelSource for PageRow {
    fn label_value(&self, name: &str) -> Option<String> {
        self.labels.get(name).cloned()
    }
}

/// Series keys emitted during one collection pass.
#[derive(Debug, Default)]
pub struct DedupSet {
    keys: HashSet<String>,
}

impl DedupSet {
    /// Returns false if the key was already present.
    pub fn insert(&mut self, key: String) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Converts a raw action field to a sample value.
pub fn coerce(value: &FieldValue, ok_value: &str) -> Result<f64, CollectError> {
    match value {
        FieldValue::Unsigned(v) => Ok(*v as f64),
        FieldValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        FieldValue::Text(s) => Ok(if s == ok_value { 1.0 } else { 0.0 }),
        other => Err(CollectError::UnsupportedType(format!(
            "{} ({})",
            other.type_name(),
            other
        ))),
    }
}

/// Pass-scoped sample builder.
pub struct Reporter<'a> {
    gateway: &'a str,
    seen: DedupSet,
}

impl<'a> Reporter<'a> {
    pub fn new(gateway: &'a str) -> Self {
        Self {
            gateway,
            seen: DedupSet::default(),
        }
    }

    /// Resolves the variable labels of `output` against `row`.
    pub fn resolve_labels(
        &self,
        output: &OutputDescriptor,
        row: &impl LabelSource,
        context: &str,
    ) -> Vec<String> {
        output
            .var_labels
            .iter()
            .map(|label| {
                if label == GATEWAY_LABEL {
                    return self.gateway.to_string();
                }

                let value = row.label_value(label).unwrap_or_else(|| {
                    debug!("{} has no result for label {}", context, label);
                    String::new()
                });

                if LOWERCASE_LABELS.contains(&label.as_str()) {
                    value.to_lowercase()
                } else {
                    value
                }
            })
            .collect()
    }

    pub fn report_action(
        &mut self,
        index: usize,
        metric: &ActionMetric,
        row: &FieldMap,
    ) -> Result<Sample, CollectError> {
        let raw = row
            .get(&metric.result)
            .ok_or_else(|| CollectError::MissingResult(metric.result.clone()))?;
        let value = coerce(raw, &metric.ok_value)?;
        let labels = self.resolve_labels(&metric.output, row, &metric.display_name());

        self.admit(&metric.output, &labels)?;
        Ok(Sample {
            source: SampleSource::Action(index),
            labels,
            value,
        })
    }

    pub fn report_page(
        &mut self,
        index: usize,
        metric: &PageMetric,
        row: &PageRow,
    ) -> Result<Sample, CollectError> {
        let labels = self.resolve_labels(&metric.output, row, &metric.display_name());

        self.admit(&metric.output, &labels)?;
        Ok(Sample {
            source: SampleSource::Page(index),
            labels,
            value: row.value,
        })
    }

    fn admit(&mut self, output: &OutputDescriptor, labels: &[String]) -> Result<(), CollectError> {
        let key = output.series_key(labels);
        if self.seen.insert(key.clone()) {
            Ok(())
        } else {
            Err(CollectError::DuplicateSeries(key))
        }
    }

    pub fn emitted(&self) -> usize {
        self.seen.len()
    }
}
