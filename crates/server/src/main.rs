use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use corral_core::{
    create_history_system, load_config, validate_config, Condor, HistoryStore, Orchestrator,
    ResourceStore, Scheduler, SqliteStore,
};
use corral_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

const WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("CORRAL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        "Configuration loaded"
    );
    info!("Database path: {:?}", config.database.path);
    info!(
        "Working directory: {:?}",
        config.orchestrator.working_directory
    );

    std::fs::create_dir_all(&config.orchestrator.working_directory).with_context(|| {
        format!(
            "Failed to create working directory {:?}",
            config.orchestrator.working_directory
        )
    })?;

    let store = Arc::new(
        SqliteStore::new(&config.database.path).context("Failed to open database")?,
    );
    info!("Store initialized");

    let (history_handle, history_writer) = create_history_system(
        Arc::clone(&store) as Arc<dyn HistoryStore>,
        config.database.history_buffer,
    );
    let writer_handle = tokio::spawn(history_writer.run());

    let scheduler: Arc<dyn Scheduler> = Arc::new(Condor::new(config.scheduler.clone()));
    info!(
        "Using {} for submission, polling logs every {}ms",
        config.scheduler.submit_command, config.scheduler.poll_interval_ms
    );

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(config.clone()),
        Arc::clone(&store) as Arc<dyn ResourceStore>,
        scheduler,
        history_handle,
        store as Arc<dyn HistoryStore>,
    ));

    let report = orchestrator
        .start()
        .await
        .context("Failed to start orchestrator")?;
    info!(
        "Recovered {} sites and {} glideins ({} failed)",
        report.sites, report.glideins, report.failed
    );

    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&orchestrator)));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    orchestrator.stop().await;

    // The orchestrator owns the last HistoryHandle; dropping it closes the
    // writer's channel so the remaining entries get flushed.
    drop(orchestrator);
    if tokio::time::timeout(WRITER_SHUTDOWN_TIMEOUT, writer_handle)
        .await
        .is_err()
    {
        error!("History writer did not stop within {:?}", WRITER_SHUTDOWN_TIMEOUT);
    } else {
        info!("History writer stopped");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
