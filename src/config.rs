//! Configuration management for fritzbox-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use axum::http::Uri;
use fritzbox_exporter::{ConfigError, MetricCatalog, DEFAULT_MIN_CACHE_TTL};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::{Args, ConfigFormat};

// Default configuration constants
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:9042";
pub const DEFAULT_METRICS_FILE: &str = "metrics.json";
pub const DEFAULT_LUA_METRICS_FILE: &str = "metrics-lua.json";
pub const DEFAULT_GATEWAY_URL: &str = "http://fritz.box:49000";
pub const DEFAULT_SERVICE_RETRY_SECONDS: u64 = 60;

/// Exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    #[serde(alias = "listen-address")]
    pub listen_address: Option<String>,

    // Metric catalogs
    #[serde(alias = "metrics-file")]
    pub metrics_file: Option<PathBuf>,
    #[serde(alias = "lua-metrics-file")]
    pub lua_metrics_file: Option<PathBuf>,
    #[serde(alias = "nolua")]
    pub disable_lua: Option<bool>,

    // Device
    #[serde(alias = "gateway-url")]
    pub gateway_url: Option<String>,
    /// Recorded device responses served instead of a live router
    #[serde(alias = "snapshot-file")]
    pub snapshot_file: Option<PathBuf>,

    // Collection tuning
    #[serde(alias = "min-cache-ttl")]
    pub min_cache_ttl: Option<i64>,
    #[serde(alias = "service-retry-seconds")]
    pub service_retry_seconds: Option<u64>,

    // Feature flags
    pub enable_health: Option<bool>,

    // Logging
    pub log_level: Option<String>,

    // TLS/SSL Configuration
    #[serde(alias = "enable-tls")]
    pub enable_tls: Option<bool>,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: Some(DEFAULT_LISTEN_ADDRESS.to_string()),
            metrics_file: Some(PathBuf::from(DEFAULT_METRICS_FILE)),
            lua_metrics_file: Some(PathBuf::from(DEFAULT_LUA_METRICS_FILE)),
            disable_lua: Some(false),
            gateway_url: Some(DEFAULT_GATEWAY_URL.to_string()),
            snapshot_file: None,
            min_cache_ttl: Some(DEFAULT_MIN_CACHE_TTL),
            service_retry_seconds: Some(DEFAULT_SERVICE_RETRY_SECONDS),
            enable_health: Some(true),
            log_level: Some("info".into()),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Config {
    pub fn lua_enabled(&self) -> bool {
        !self.disable_lua.unwrap_or(false)
    }

    pub fn ttl_floor(&self) -> i64 {
        self.min_cache_ttl.unwrap_or(DEFAULT_MIN_CACHE_TTL)
    }
}

/// Host part of the gateway URL, used as the value of `gateway` labels.
pub fn gateway_host(cfg: &Config) -> Result<String, Box<dyn std::error::Error>> {
    let url = cfg.gateway_url.as_deref().unwrap_or(DEFAULT_GATEWAY_URL);
    let uri: Uri = url
        .parse()
        .map_err(|e| format!("Invalid gateway_url '{}': {}", url, e))?;
    match uri.host() {
        Some(host) if !host.is_empty() => Ok(host.to_string()),
        _ => Err(format!("gateway_url '{}' has no host", url).into()),
    }
}

/// Loads the action catalog and, unless Lua metrics are disabled, the page catalog.
pub fn load_catalog(cfg: &Config) -> Result<MetricCatalog, ConfigError> {
    let action_file = cfg
        .metrics_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_METRICS_FILE));
    let page_file = if cfg.lua_enabled() {
        Some(
            cfg.lua_metrics_file
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LUA_METRICS_FILE)),
        )
    } else {
        None
    };
    MetricCatalog::load(&action_file, page_file.as_deref(), cfg.ttl_floor())
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    gateway_host(cfg)?;

    if let Some(addr) = cfg.listen_address.as_deref() {
        if addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!("Invalid listen_address '{}', expected ip:port", addr).into());
        }
    }

    if cfg.ttl_floor() < 1 {
        return Err("min_cache_ttl must be at least 1 second".into());
    }

    if cfg.service_retry_seconds == Some(0) {
        return Err("service_retry_seconds must be at least 1 second".into());
    }

    let lua_file_empty = cfg
        .lua_metrics_file
        .as_ref()
        .is_some_and(|p| p.as_os_str().is_empty());
    if cfg.lua_enabled() && lua_file_empty {
        return Err("Lua metrics are enabled but lua_metrics_file is empty".into());
    }

    if let Some(snapshot) = cfg.snapshot_file.as_deref() {
        if !snapshot.exists() {
            return Err(format!("Snapshot file not found: {}", snapshot.display()).into());
        }
    }

    // TLS validation
    if cfg.enable_tls.unwrap_or(false) {
        match (cfg.tls_cert_path.as_deref(), cfg.tls_key_path.as_deref()) {
            (None, None) => {
                return Err(
                    "TLS is enabled but neither tls_cert_path nor tls_key_path are set".into(),
                );
            }
            (Some(_), None) => {
                return Err("TLS is enabled but tls_key_path is not set".into());
            }
            (None, Some(_)) => {
                return Err("TLS is enabled but tls_cert_path is not set".into());
            }
            (Some(cert), Some(key)) => {
                check_pem_file(cert, "certificate")?;
                check_pem_file(key, "private key")?;
            }
        }
    }

    Ok(())
}

fn check_pem_file(path: &str, what: &str) -> Result<(), Box<dyn std::error::Error>> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => Err(format!("TLS {} file is empty: {}", what, path).into()),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("TLS {} file not found: {}", what, path).into())
        }
        Err(e) => Err(format!("TLS {} file is not readable: {} ({})", what, path, e).into()),
    }
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(addr) = &args.listen_address {
        config.listen_address = Some(addr.clone());
    }
    if let Some(path) = &args.metrics_file {
        config.metrics_file = Some(path.clone());
    }
    if let Some(path) = &args.lua_metrics_file {
        config.lua_metrics_file = Some(path.clone());
    }
    if args.nolua {
        config.disable_lua = Some(true);
    }

    if let Some(url) = &args.gateway_url {
        config.gateway_url = Some(url.clone());
    }
    if let Some(path) = &args.snapshot_file {
        config.snapshot_file = Some(path.clone());
    }

    if let Some(ttl) = args.min_cache_ttl {
        config.min_cache_ttl = Some(ttl);
    }
    if let Some(secs) = args.service_retry_seconds {
        config.service_retry_seconds = Some(secs);
    }

    if args.disable_health {
        config.enable_health = Some(false);
    }

    // TLS configuration: CLI wins if provided
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert_path) = &args.tls_cert {
        config.tls_cert_path = Some(cert_path.to_string_lossy().to_string());
    }
    if let Some(key_path) = &args.tls_key {
        config.tls_key_path = Some(key_path.to_string_lossy().to_string());
    }

    Ok(config)
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => PathBuf::from(p),
        None => {
            let defaults = [
                "/etc/fritzbox-exporter/config.yaml",
                "/etc/fritzbox-exporter/config.yml",
                "/etc/fritzbox-exporter/config.json",
                "./fritzbox-exporter.yaml",
                "./fritzbox-exporter.yml",
                "./fritzbox-exporter.json",
            ];

            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(p) => PathBuf::from(p),
                None => return Ok(Config::default()),
            }
        }
    };

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    println!("{output}");
    Ok(())
}
