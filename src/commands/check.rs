//! Check command implementation.
//!
//! Validates configuration, both metric catalogs and the snapshot device.

use fritzbox_exporter::device::ServiceDiscovery;
use fritzbox_exporter::SeriesExporter;
use prometheus::Registry;

use crate::config::{gateway_host, load_catalog, validate_effective_config, Config};
use crate::state::open_device;

/// Validates configuration and catalogs.
pub fn command_check(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 FRITZ!Box Exporter - Check");
    println!("==============================");

    let mut all_ok = true;

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => {
            println!("   ✅ Configuration is valid");
            if let Ok(host) = gateway_host(config) {
                println!("   ✅ Gateway label value: {}", host);
            }
        }
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📊 Checking metric catalogs...");
    match load_catalog(config) {
        Ok(catalog) => {
            println!(
                "   ✅ {} action metrics, {} page metrics, {} label renames",
                catalog.actions().len(),
                catalog.pages().len(),
                catalog.renames().len()
            );
            println!("   ✅ Cache TTL floor: {}s", catalog.ttl_floor());
            match SeriesExporter::new(&Registry::new(), &catalog) {
                Ok(exporter) => println!("   ✅ {} metric families", exporter.family_count()),
                Err(e) => {
                    println!("   ❌ {}", e);
                    all_ok = false;
                }
            }
        }
        Err(e) => {
            println!("   ❌ {}", e);
            all_ok = false;
        }
    }

    println!("\n📦 Checking device...");
    match open_device(config).and_then(|d| d.discover().map_err(Into::into)) {
        Ok(table) => println!(
            "   ✅ {} services, {} actions",
            table.services.len(),
            table.action_count()
        ),
        Err(e) => {
            println!("   ❌ {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review the output above");
        std::process::exit(1);
    }
}
