//! Services command implementation.
//!
//! Lists every service and action the router announces. Actions without
//! input arguments are called and their results printed; optionally a
//! starting point for an action metric catalog is written.

use fritzbox_exporter::catalog::{ActionMetricConfig, PromDesc};
use fritzbox_exporter::device::ServiceDiscovery;
use std::fs;
use std::path::PathBuf;

use crate::config::Config;
use crate::state::open_device;

/// Catalog entry for one result field of a get-only action.
///
/// The metric name is derived from action and field, e.g. `GetTotalBytesSent`
/// and `NewTotalBytesSent` give `gateway_totalbytessent_totalbytessent`.
fn template_entry(service: &str, action: &str, field: &str) -> ActionMetricConfig {
    let action_part = action.strip_prefix("Get").unwrap_or(action);
    let field_part = field.strip_prefix("New").unwrap_or(field);
    let fq_name = format!("gateway_{}_{}", metric_name_part(action_part), metric_name_part(field_part));

    ActionMetricConfig {
        service: service.to_string(),
        action: action.to_string(),
        result: field.to_string(),
        prom_desc: PromDesc {
            fq_name,
            help: format!("{} of {}", field, action),
            var_labels: vec!["gateway".to_string()],
            ..PromDesc::default()
        },
        prom_type: "GaugeValue".to_string(),
        ..ActionMetricConfig::default()
    }
}

fn metric_name_part(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

pub fn command_services(
    json_out: Option<PathBuf>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let device = open_device(config)?;
    let table = device.discover()?;

    println!("🔍 Services of {}", config.gateway_url.as_deref().unwrap_or("gateway"));
    println!("================================");

    let mut template = Vec::new();

    for service_id in table.service_names() {
        let Some(service) = table.services.get(service_id) else {
            continue;
        };
        println!("\n📦 {} ({})", service_id, service.control_url);

        let mut action_names: Vec<&String> = service.actions.keys().collect();
        action_names.sort();

        for name in action_names {
            let action = &service.actions[name];
            let info = action.info();
            println!("   ├─ {}", name);
            for input in &info.inputs {
                println!("   │  ├─ in:  {}", input);
            }

            if !info.is_get_only() {
                for output in &info.outputs {
                    println!("   │  ├─ out: {}", output);
                }
                continue;
            }

            match action.call(None) {
                Ok(result) => {
                    let mut fields: Vec<_> = result.iter().collect();
                    fields.sort_by(|a, b| a.0.cmp(b.0));
                    for (field, value) in fields {
                        println!("   │  ├─ {} = {}", field, value);
                        template.push(template_entry(service_id, name, field));
                    }
                }
                Err(e) => println!("   │  ├─ ❌ {}", e),
            }
        }
    }

    println!(
        "\n📋 {} services, {} actions",
        table.services.len(),
        table.action_count()
    );

    if let Some(path) = json_out {
        fs::write(&path, serde_json::to_string_pretty(&template)?)?;
        println!("✅ Wrote {} template entries to {}", template.len(), path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fritzbox_exporter::MetricCatalog;

    #[test]
    fn test_template_loads_as_catalog() {
        let template = vec![
            template_entry(
                "urn:dslforum-org:service:WANCommonInterfaceConfig:1",
                "GetTotalBytesSent",
                "NewTotalBytesSent",
            ),
            template_entry("urn:dslforum-org:service:DeviceInfo:1", "GetInfo", "NewUpTime"),
        ];
        let json = serde_json::to_string_pretty(&template).unwrap();

        let parsed: Vec<ActionMetricConfig> = serde_json::from_str(&json).unwrap();
        let catalog = MetricCatalog::build(parsed, None, 30).unwrap();
        assert_eq!(catalog.actions().len(), 2);
        assert_eq!(
            catalog.actions()[0].output.fq_name,
            "gateway_totalbytessent_totalbytessent"
        );
        assert_eq!(catalog.actions()[1].output.fq_name, "gateway_info_uptime");
        assert_eq!(catalog.actions()[1].result, "NewUpTime");
    }

    #[test]
    fn test_metric_name_part() {
        assert_eq!(metric_name_part("X_AVM-DE_Speed"), "x_avm_de_speed");
    }
}
