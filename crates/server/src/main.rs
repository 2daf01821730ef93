use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use ptpilot_core::{
    load_config, validate_config, BackendPool, CachedTracker, DirectoryStore, Engine,
    EngineSettings, HttpConnector, JobContext, LifecycleStore, MTeamClient, SqliteDirectoryStore,
    SqliteLifecycleStore, TrackerClient,
};
use ptpilot_server::{create_router, AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());

    let json = std::env::var("PTPILOT_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

async fn run() -> Result<()> {
    init_tracing();

    let config_path = std::env::var("PTPILOT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    let directory: Arc<dyn DirectoryStore> = Arc::new(
        SqliteDirectoryStore::new(&config.database.path)
            .context("Failed to open directory store")?,
    );
    let lifecycle: Arc<dyn LifecycleStore> = Arc::new(
        SqliteLifecycleStore::new(&config.database.path)
            .context("Failed to open lifecycle store")?,
    );
    info!("Stores initialized");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let site = MTeamClient::new(&config.tracker).context("Failed to create tracker client")?;
    let cached = Arc::new(CachedTracker::new(Arc::new(site), &config.tracker.cache));
    let sweeper = Arc::clone(&cached).spawn_sweeper(
        Duration::from_secs(config.tracker.cache.sweep_interval_secs.max(1)),
        shutdown_tx.subscribe(),
    );
    let tracker: Arc<dyn TrackerClient> = cached;
    info!("Tracker client initialized for {}", config.tracker.base_url);

    let backends = Arc::new(BackendPool::new(Arc::new(HttpConnector::new(
        config.downloader,
    ))));

    let ctx = Arc::new(JobContext::new(
        directory,
        lifecycle,
        tracker,
        backends,
        EngineSettings::from_config(&config),
    ));
    let engine = Arc::new(Engine::new(ctx));
    engine.start();

    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&engine)));
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
    engine.stop().await;
    info!("Engine stopped");

    let _ = shutdown_tx.send(());
    if let Err(e) = sweeper.await {
        warn!("Tracker cache sweeper ended abnormally: {}", e);
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
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
            Ok(mut stream) => {
                stream.recv().await;
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
