//! fritzbox-exporter - version 0.1.0
//!
//! Prometheus exporter for FRITZ!Box routers with tracing logging.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;
mod config;
mod handlers;
mod state;

use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use fritzbox_exporter::device::ServiceDiscovery;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn, Level};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_collect, command_pages, command_services};
use config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_LISTEN_ADDRESS,
    DEFAULT_SERVICE_RETRY_SECONDS,
};
use handlers::{health_handler, metrics_handler, root_handler};
use state::{AppState, Pipeline};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => Level::ERROR,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {:?}", args.log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format.clone());
    }

    setup_logging(&args);

    // Handle subcommands
    if let Some(command) = &args.command {
        let config = load_validated_config(&args)?;

        return match command {
            Commands::Collect => command_collect(&config),
            Commands::Services { json_out } => command_services(json_out.clone(), &config),
            Commands::Pages { file } => command_pages(file, &config),
            Commands::Check => command_check(&config),
        };
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;

    info!("Starting fritzbox-exporter");

    let pipeline = Pipeline::build(&config)?;
    let bootstrap = Arc::clone(&pipeline.bootstrap);
    let discovery: Arc<dyn ServiceDiscovery> = pipeline.device.clone();
    let state = Arc::new(AppState::new(pipeline, config.clone()));

    let retry = Duration::from_secs(
        config
            .service_retry_seconds
            .unwrap_or(DEFAULT_SERVICE_RETRY_SECONDS),
    );
    tokio::spawn(bootstrap.run(discovery, retry));
    info!(
        "Service discovery started, retrying every {}s until loaded",
        retry.as_secs()
    );

    if !config.lua_enabled() {
        warn!("Lua page metrics are disabled, only action metrics will be collected");
    }

    // Configure HTTP server routes
    let listen = config
        .listen_address
        .as_deref()
        .unwrap_or(DEFAULT_LISTEN_ADDRESS);
    let addr: SocketAddr = listen.parse()?;

    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler));

    if config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }

    let app = app.with_state(state);

    if config.enable_tls.unwrap_or(false) {
        let cert_path = config
            .tls_cert_path
            .as_ref()
            .ok_or("tls_cert_path must be set when enable_tls is true")?;
        let key_path = config
            .tls_key_path
            .as_ref()
            .ok_or("tls_key_path must be set when enable_tls is true")?;

        info!("Loading TLS certificate from: {}", cert_path);
        info!("Loading TLS private key from: {}", key_path);

        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .map_err(|e| {
                error!("Failed to load TLS configuration: {}", e);
                e
            })?;

        info!("fritzbox-exporter listening on https://{}", addr);

        let server = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service());

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received, exiting...");
            }
        }
    } else {
        let listener = TcpListener::bind(addr).await?;
        info!("fritzbox-exporter listening on http://{}", addr);

        let server = axum::serve(listener, app);

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received, exiting...");
            }
        }
    }

    info!("fritzbox-exporter stopped gracefully");
    Ok(())
}
