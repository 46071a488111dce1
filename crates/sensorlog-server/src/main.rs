//! Sensorlog server
//!
//! Records sensor readings from many devices into per-device CSV logs while
//! an operator-controlled session is running, and hands the session back as
//! a ZIP archive when it stops.
//!
//! Usage:
//! ```bash
//! sensorlog-server --config sensorlog.yaml
//! SENSORLOG_DATA_DIR=/var/lib/sensorlog sensorlog-server --port 8000
//! ```
//!
//! Try it:
//! ```bash
//! curl -X POST http://localhost:8000/api/session/start
//! curl http://localhost:8000/api/ingest \
//!   -H "Content-Type: application/json" \
//!   -d '{"device_id": "tof_01", "samples": [{"distance_m": 1.2, "status": 0}]}'
//! curl -X POST http://localhost:8000/api/session/stop -o session.zip
//! ```

use anyhow::Context;
use clap::Parser;
use sensorlog_observability::{HealthState, Metrics};
use sensorlog_server::{AppState, ServerConfig, StorageReadiness, app};
use sensorlog_session::SessionRecorder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Sensorlog Server - session-based sensor data logging
#[derive(Parser)]
#[command(name = "sensorlog-server")]
#[command(about = "Session-based multi-device sensor logging server", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, value_name = "FILE", env = "SENSORLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for live session logs
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Directory to keep a copy of every session archive
    #[arg(long, value_name = "DIR")]
    archive_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    config.merge_env();

    // CLI flags take precedence over file and env
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(dir) = cli.data_dir {
        config.recording.data_dir = dir;
    }
    if let Some(dir) = cli.archive_dir {
        config.recording.archive_dir = Some(dir);
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    config.expand_paths();
    config.validate()?;

    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    std::fs::create_dir_all(&config.recording.data_dir).with_context(|| {
        format!(
            "creating data directory {}",
            config.recording.data_dir.display()
        )
    })?;
    if let Some(dir) = &config.recording.archive_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating archive directory {}", dir.display()))?;
    }

    info!(
        data_dir = %config.recording.data_dir.display(),
        archive_dir = ?config.recording.archive_dir,
        max_batch_samples = config.recording.max_batch_samples,
        "Initializing session recorder"
    );

    let recorder = Arc::new(SessionRecorder::new(config.recording.clone()));
    let metrics = Arc::new(
        Metrics::new().map_err(|e| anyhow::anyhow!("Failed to create metrics registry: {}", e))?,
    );
    let health = HealthState::with_readiness_checker(
        Arc::clone(&metrics),
        Arc::new(StorageReadiness::new(&config.recording)),
    );
    let state =
        AppState::new(Arc::clone(&recorder), metrics).with_body_limit(config.max_body_bytes);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Sensorlog listening on http://{}", addr);
    info!("   - Start session: POST http://{}/api/session/start", addr);
    info!("   - Stop session:  POST http://{}/api/session/stop", addr);
    info!("   - Ingest:        POST http://{}/api/ingest", addr);
    info!("   - Health check:  http://{}/healthz", addr);
    info!("   - Metrics:       http://{}/metrics", addr);

    axum::serve(listener, app(state, health))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Don't strand a running session as loose per-device logs
    match tokio::task::spawn_blocking(move || recorder.shutdown()).await? {
        Ok(Some(stopped)) => info!(
            session_id = %stopped.session_id,
            path = ?stopped.archive.persisted_to,
            "Active session archived at shutdown"
        ),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Failed to archive active session at shutdown"),
    }

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
