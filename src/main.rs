//! casgate -- S3-compatible gateway for content-addressed container storage.
//!
//! SIGTERM/SIGINT stop accepting connections and give in-flight requests
//! `server.shutdown_timeout` seconds to finish before the process exits.

use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use casgate::config::{Config, LoggingConfig};

/// Command-line arguments for the casgate server.
#[derive(Parser, Debug)]
#[command(
    name = "casgate",
    version,
    about = "S3-compatible gateway for content-addressed container storage"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "casgate.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

/// Initialize tracing. `RUST_LOG` takes precedence over the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config: Config = casgate::config::load_config(&cli.config)?;
    init_logging(&config.logging);

    if Path::new(&cli.config).exists() {
        info!("Loaded configuration from {}", cli.config);
    } else {
        warn!("Configuration file {} not found, using defaults", cli.config);
    }

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        casgate::metrics::init_metrics()?;
        info!("Prometheus metrics initialized");
    }

    info!(
        max_size_bytes = config.storage.memory.max_size_bytes,
        read_chunk_size = config.storage.memory.read_chunk_size,
        "In-memory container network initialized"
    );
    let shutdown_timeout = config.server.shutdown_timeout;
    let state = Arc::new(casgate::AppState::in_memory(config));

    let app = casgate::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("casgate listening on {}", bind_addr);

    // Once a signal arrives, in-flight requests get `shutdown_timeout`
    // seconds to finish.
    let shutdown_timeout = Duration::from_secs(shutdown_timeout);
    let (signal_tx, mut signal_rx) = watch::channel(false);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signal_tx.send(true);
    });
    let drain_deadline = async move {
        if signal_rx.wait_for(|fired| *fired).await.is_ok() {
            tokio::time::sleep(shutdown_timeout).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server.into_future() => result?,
        _ = drain_deadline => {
            warn!(
                "In-flight requests did not finish within {}s, exiting",
                shutdown_timeout.as_secs()
            );
        }
    }

    info!("casgate shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
