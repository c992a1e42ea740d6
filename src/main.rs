//! Eventdeck Engine
//!
//! Event search and recommendation service.
//!
//! # Architecture
//!
//! - **Event Store**: memory (seedable) or PostgreSQL backend
//! - **Discovery Service**: snapshot fetch, filtering and ranking
//! - **API Server**: REST endpoints for frontend consumption
//!
//! # Graceful Shutdown
//!
//! The engine handles SIGTERM and SIGINT signals, ensuring:
//! - In-flight requests complete
//! - Store connections are closed cleanly
//! - Log buffers are flushed

use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use eventdeck::api::{self, AppState};
use eventdeck::config::{Config, LogFormat, LoggingConfig};
use eventdeck::error::Result;
use eventdeck::service::DiscoveryService;
use eventdeck::store;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing with structured logging; the guard flushes file logs on drop
    let _log_guard = init_tracing(&config.logging);

    info!("═══════════════════════════════════════════════════════════════");
    info!("  🚀 Eventdeck Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════════════════════════");
    config.log_summary();
    info!("✅ Configuration loaded and validated");

    #[cfg(feature = "metrics")]
    init_metrics_exporter(config.metrics_port)?;

    // Connect the event store
    let store = store::connect(&config.store).await?;
    match store.health_check().await {
        Ok(()) => info!("✅ Event store ready ({})", store.backend_name()),
        Err(e) => warn!("⚠️ Event store not healthy at startup: {}", e),
    }

    let service = DiscoveryService::new(store.clone(), config.recommendation.clone());
    let state = AppState::new(service);

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    info!("🌐 Starting API server on port {}...", config.api.port);
    let mut shutdown_rx = shutdown_tx.subscribe();
    let api_config = config.api.clone();
    let mut server = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.recv().await;
        };
        if let Err(e) = api::start_server(state, &api_config, shutdown).await {
            error!("API server error: {:?}", e);
        }
    });

    info!("═══════════════════════════════════════════════════════════════");
    info!("  📡 API: http://{}:{}", config.api.host, config.api.port);
    info!(
        "  🔗 Health: http://{}:{}/health",
        config.api.host, config.api.port
    );
    info!("═══════════════════════════════════════════════════════════════");

    // Wait for shutdown signal or server exit
    tokio::select! {
        _ = shutdown_signal() => {
            info!("📴 Shutdown signal received");
        }
        _ = &mut server => {
            warn!("⚠️ API server exited, shutting down");
        }
    }

    // Graceful shutdown
    info!("🛑 Initiating graceful shutdown...");
    let _ = shutdown_tx.send(());

    let shutdown_timeout = Duration::from_secs(30);
    if !server.is_finished()
        && tokio::time::timeout(shutdown_timeout, server).await.is_err()
    {
        warn!("⚠️ Shutdown timeout exceeded, forcing exit");
    }

    store.close().await;

    info!("👋 Eventdeck Engine stopped gracefully");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default log levels
        EnvFilter::new("eventdeck=debug,eventdeck_engine=debug,tower_http=debug,sqlx=warn,info")
    });

    let (file_layer, guard) = match config.dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(std::env::var("NO_COLOR").is_err()),
            )
            .init(),
    }

    guard
}

/// Install the Prometheus recorder and its scrape endpoint
#[cfg(feature = "metrics")]
fn init_metrics_exporter(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| eventdeck::Error::config(format!("Failed to start metrics exporter: {}", e)))?;
    info!("📈 Prometheus metrics on port {}", port);
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
