//! CLI arguments and subcommands for fritzbox-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "fritzbox-exporter",
    about = "Prometheus exporter for FRITZ!Box routers",
    long_about = "Prometheus exporter for FRITZ!Box routers.\n\n\
                  Collects UPnP (TR-064) action results and Lua page values as described \
                  by JSON metric catalogs, caching every device call for at least its \
                  configured lifetime.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Address to listen on for HTTP requests (host:port)
    #[arg(short = 'l', long)]
    pub listen_address: Option<String>,

    /// JSON (or YAML) file with the UPnP action metric definitions
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,

    /// JSON (or YAML) file with the Lua page metric definitions
    #[arg(long)]
    pub lua_metrics_file: Option<PathBuf>,

    /// Disable collection of Lua page metrics
    #[arg(long)]
    pub nolua: bool,

    /// UPnP URL of the router
    #[arg(long)]
    pub gateway_url: Option<String>,

    /// Minimum lifetime of cached results in seconds
    #[arg(long)]
    pub min_cache_ttl: Option<i64>,

    /// Seconds between service discovery attempts until it succeeds
    #[arg(long)]
    pub service_retry_seconds: Option<u64>,

    /// Recorded device responses to serve instead of a live router
    #[arg(short = 's', long)]
    pub snapshot_file: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single collection pass and print the metrics to stdout
    Collect,

    /// List all services and actions of the router and call the get-only actions
    Services {
        /// Also write an action metric template for all get-only results
        #[arg(long)]
        json_out: Option<PathBuf>,
    },

    /// Load the pages listed in FILE and dump their content
    Pages {
        /// JSON file with a list of {"path", "params"} entries
        #[arg(short = 'f', long, default_value = "luaTest.json")]
        file: PathBuf,
    },

    /// Validate configuration and metric catalogs
    Check,
}
