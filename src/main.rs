//! admin-metrics-aggregator
//!
//! Scrapes node-local upstream metrics endpoints, attaches static labels per
//! source and serves the merged exposition document from a coalescing cache.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;
mod handlers;
mod state;

use admin_metrics_aggregator::config::{validate_effective_config, Config};
use admin_metrics_aggregator::tls::{install_crypto_provider, load_server_config};
use admin_metrics_aggregator::{Aggregator, AggregatorMetrics, Cache, ConfigError};
use clap::Parser;
use prometheus::{Gauge, Registry};
use std::sync::Arc;
use std::time::Instant;
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, warn, Level};

use cli::{resolve_config, show_config, Args, Commands, LogLevel};
use commands::{command_config, command_test};
use state::AppState;

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = match args.log_level {
        LogLevel::Off => return Ok(()),
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

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Logging initialized with level: {:?}", args.log_level);
    Ok(())
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

/// Completes on SIGINT or SIGTERM.
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
                error!("Failed to install SIGTERM handler: {}", e);
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
    install_crypto_provider();

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

        return show_config(&config, args.config_format);
    }

    if let Some(command) = &args.command {
        return match command {
            Commands::Config {
                output,
                format,
                commented,
            } => command_config(output.clone(), format.clone(), *commented),

            Commands::Test { quiet } => {
                let config = load_validated_config(&args)?;
                setup_logging(&args)?;
                Ok(command_test(*quiet, &config).await?)
            }
        };
    }

    let config = load_validated_config(&args)?;

    setup_logging(&args)?;

    info!("Starting admin-metrics-aggregator");

    let ttl = config.refresh_duration()?;

    // Initialize Prometheus metrics registry
    let registry = Registry::new();
    debug!("Prometheus registry initialized");

    let telemetry = AggregatorMetrics::new(&registry)?;
    let scrape_duration = Gauge::new(
        "admin_metrics_scrape_duration_seconds",
        "Time spent serving the last /metrics request",
    )?;
    registry.register(Box::new(scrape_duration.clone()))?;
    debug!("All metrics registered successfully");

    let settings = config.source_settings()?;
    if settings.is_empty() {
        warn!("No upstream_metrics_sources configured - /project-metrics will be empty");
    }
    let upstream = Aggregator::from_settings(&settings)?.with_metrics(telemetry.clone());
    let node = Aggregator::for_node(&config)?;
    info!(
        "Configured {} upstream sources and {} node collectors, refresh duration {:?}",
        upstream.sources().len(),
        node.sources().len(),
        ttl
    );

    let state = Arc::new(AppState {
        registry,
        scrape_duration,
        upstream: Cache::new(upstream, ttl).with_metrics(telemetry),
        node,
        start_time: Instant::now(),
    });

    let addr = config.listen_addr()?;
    let app = handlers::router(state, config.enable_health.unwrap_or(true));

    if config.enable_tls.unwrap_or(false) {
        // Presence of both paths was checked by validate_effective_config()
        let (Some(cert_path), Some(key_path)) = (&config.tls_cert_path, &config.tls_key_path)
        else {
            return Err(ConfigError::Tls(
                "enable_tls is true but tls_cert_path or tls_key_path is missing".into(),
            )
            .into());
        };

        info!("Loading TLS certificate from: {}", cert_path);
        info!("Loading TLS private key from: {}", key_path);

        let tls_config = load_server_config(cert_path, key_path)
            .await
            .map_err(|e| {
                error!("Failed to load TLS configuration: {}", e);
                e
            })?;

        info!(
            "admin-metrics-aggregator listening on https://{}",
            addr
        );

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown_handle.graceful_shutdown(None);
        });

        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .map_err(|e| {
                error!("Server error: {}", e);
                e
            })?;
    } else {
        let listener = TcpListener::bind(addr).await?;
        info!(
            "admin-metrics-aggregator listening on http://{}",
            addr
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                error!("Server error: {}", e);
                e
            })?;
    }

    info!("admin-metrics-aggregator stopped gracefully");
    Ok(())
}
