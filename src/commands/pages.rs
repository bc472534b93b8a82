//! Pages command implementation.
//!
//! Loads every page listed in a JSON file through the page loader and dumps
//! the decoded body. Useful for writing page metric definitions.

use fritzbox_exporter::device::{JsonPageDecoder, PageDecoder, PageRequest};
use fritzbox_exporter::SessionReauthCoordinator;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::state::open_device;

#[derive(Deserialize)]
struct PageEntry {
    path: String,
    #[serde(default)]
    params: String,
}

pub fn command_pages(file: &Path, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let entries: Vec<PageEntry> = serde_json::from_str(&std::fs::read_to_string(file)?)?;
    let coordinator = SessionReauthCoordinator::new(Arc::new(open_device(config)?));
    let decoder = JsonPageDecoder;

    let mut failed = 0;
    for entry in entries {
        let page = PageRequest::new(entry.path, entry.params);
        println!("TESTING: {}", page);

        match coordinator.load(&page) {
            Ok(body) => match decoder.decode(&body) {
                Ok(value) => println!("{}\n", serde_json::to_string_pretty(&value)?),
                Err(e) => {
                    failed += 1;
                    println!("❌ {}\n", e);
                }
            },
            Err(e) => {
                failed += 1;
                println!("❌ {}\n", e);
            }
        }
    }

    if failed > 0 {
        println!("⚠️  {} pages failed", failed);
    }
    Ok(())
}
