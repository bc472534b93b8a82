//! Row extraction from decoded Lua pages.
//!
//! A page metric names a dotted `resultPath` into the decoded document and a
//! `resultKey` holding the value. A `*` path segment fans out over every
//! element of an array or object, yielding one row per element.

use ahash::AHashMap as HashMap;
use regex::Regex;
use serde_json::Value;

use crate::error::DeviceError;

/// Rewrites label values matching `pattern` to `name`.
#[derive(Debug, Clone)]
pub struct LabelRename {
    pub pattern: Regex,
    pub name: String,
}

/// What to read from a decoded page for one metric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueDefinition {
    pub path: String,
    pub key: String,
    pub ok_value: String,
    pub labels: Vec<String>,
}

/// One extracted value and the label fields found next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRow {
    pub value: f64,
    pub labels: HashMap<String, String>,
}

/// Extracts label/value rows from a decoded page.
pub trait RowExtractor: Send + Sync {
    fn extract(
        &self,
        page: &Value,
        definition: &ValueDefinition,
        renames: &[LabelRename],
    ) -> Result<Vec<PageRow>, DeviceError>;
}

/// Path/key extractor over `serde_json` documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRowExtractor;

impl RowExtractor for JsonRowExtractor {
    fn extract(
        &self,
        page: &Value,
        definition: &ValueDefinition,
        renames: &[LabelRename],
    ) -> Result<Vec<PageRow>, DeviceError> {
        let mut elements = Vec::new();
        let segments: Vec<&str> = split_path(&definition.path);
        select(page, &segments, &definition.path, &mut elements)?;

        let key_segments = split_path(&definition.key);
        let mut rows = Vec::with_capacity(elements.len());

        for element in elements {
            let raw = key_segments
                .iter()
                .try_fold(element, |current, segment| lookup(current, segment))
                .ok_or_else(|| {
                    DeviceError::InvalidResponse(format!(
                        "{}.{} not found",
                        definition.path, definition.key
                    ))
                })?;

            let value = numeric_value(raw, &definition.ok_value).ok_or_else(|| {
                DeviceError::InvalidResponse(format!(
                    "{}.{} has unsupported value {}",
                    definition.path, definition.key, raw
                ))
            })?;

            let mut labels = HashMap::new();
            for label in &definition.labels {
                if let Some(text) = lookup(element, label).and_then(label_text) {
                    labels.insert(label.clone(), rename_label(renames, text));
                }
            }

            rows.push(PageRow { value, labels });
        }

        Ok(rows)
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

fn select<'a>(
    value: &'a Value,
    segments: &[&str],
    path: &str,
    out: &mut Vec<&'a Value>,
) -> Result<(), DeviceError> {
    let Some((segment, rest)) = segments.split_first() else {
        out.push(value);
        return Ok(());
    };

    if *segment == "*" {
        match value {
            Value::Array(items) => {
                for item in items {
                    select(item, rest, path, out)?;
                }
            }
            Value::Object(map) => {
                for item in map.values() {
                    select(item, rest, path, out)?;
                }
            }
            _ => {
                return Err(DeviceError::InvalidResponse(format!(
                    "wildcard in {path} does not point to a list"
                )))
            }
        }
        return Ok(());
    }

    let child = lookup(value, segment).ok_or_else(|| {
        DeviceError::InvalidResponse(format!("path {path} not found at {segment}"))
    })?;
    select(child, rest, path, out)
}

fn lookup<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn numeric_value(value: &Value, ok_value: &str) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => match parse_leading_float(s.trim()) {
            Some(v) => Some(v),
            None if !ok_value.is_empty() && s == ok_value => Some(1.0),
            None => Some(0.0),
        },
        _ => None,
    }
}

/// Parses the numeric prefix of strings like `"42 %"` or `"-3.5dB"`.
fn parse_leading_float(s: &str) -> Option<f64> {
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || ((c == '-' || c == '+') && i == 0)))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

fn label_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn rename_label(renames: &[LabelRename], value: String) -> String {
    renames
        .iter()
        .find(|r| r.pattern.is_match(&value))
        .map(|r| r.name.clone())
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(path: &str, key: &str, labels: &[&str]) -> ValueDefinition {
        ValueDefinition {
            path: path.to_string(),
            key: key.to_string(),
            ok_value: String::new(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_extract_single_value() {
        let page = json!({"data": {"cpuutil": {"series": [["12", "15"]]}, "cputemp": "58"}});
        let rows = JsonRowExtractor
            .extract(&page, &definition("data", "cputemp", &[]), &[])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 58.0);
    }

    #[test]
    fn test_extract_wildcard_with_labels_and_renames() {
        let page = json!({"data": {"drain": [
            {"name": "Hauptprozessor", "actPerc": "31 %"},
            {"name": "WLAN", "actPerc": 12},
        ]}});
        let renames = vec![LabelRename {
            pattern: Regex::new("(?i)prozessor").unwrap(),
            name: "CPU".to_string(),
        }];
        let rows = JsonRowExtractor
            .extract(
                &page,
                &definition("data.drain.*", "actPerc", &["name"]),
                &renames,
            )
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, 31.0);
        assert_eq!(rows[0].labels["name"], "CPU");
        assert_eq!(rows[1].value, 12.0);
        assert_eq!(rows[1].labels["name"], "WLAN");
    }

    #[test]
    fn test_extract_ok_value() {
        let page = json!({"data": {"lan": {"state": "on"}}});
        let mut def = definition("data.lan", "state", &[]);
        def.ok_value = "on".to_string();
        let rows = JsonRowExtractor.extract(&page, &def, &[]).unwrap();
        assert_eq!(rows[0].value, 1.0);
    }

    #[test]
    fn test_extract_missing_path_is_error() {
        let page = json!({"data": {}});
        let err = JsonRowExtractor
            .extract(&page, &definition("data.drain.*", "actPerc", &[]), &[])
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidResponse(_)));
    }

    #[test]
    fn test_extract_empty_list_yields_no_rows() {
        let page = json!({"data": {"drain": []}});
        let rows = JsonRowExtractor
            .extract(&page, &definition("data.drain.*", "actPerc", &[]), &[])
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_parse_leading_float() {
        assert_eq!(parse_leading_float("42 %"), Some(42.0));
        assert_eq!(parse_leading_float("-3.5dB"), Some(-3.5));
        assert_eq!(parse_leading_float("off"), None);
    }
}
