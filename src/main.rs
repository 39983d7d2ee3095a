//! BossNouadi server entry point
//!
//! Wires the storage layer, backup engine, scheduler and HTTP API together
//! and serves until interrupted.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bossnouadi_api::AppState;
use bossnouadi_backup::scheduler::SchedulerConfig;
use bossnouadi_backup::{AssetStore, BackupEngine, BackupScheduler, DriveTarget};
use bossnouadi_db::Storage;

mod config;
use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("BOSSNOUADI_CONFIG").ok())
        .map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log)),
        )
        .init();

    info!("🚀 Starting BossNouadi server v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("📁 Using configuration file {:?}", path);
    }

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("creating data directory")?;
    }
    let storage = Arc::new(
        Storage::open(&config.database_path)
            .await
            .context("opening database")?,
    );

    let drive = match config.drive_auth().context("resolving drive credential")? {
        Some(auth) => {
            info!("☁️ Cloud backup target configured ({})", config.backup.drive_folder);
            Some(DriveTarget::new(
                auth,
                config.backup.drive_folder.clone(),
                config.backup.file_prefix.clone(),
            ))
        }
        None => {
            info!("☁️ No drive credential configured, cloud backup disabled");
            None
        }
    };

    let engine = Arc::new(BackupEngine::new(
        storage.clone(),
        config.backup_config(),
        drive,
    ));

    let mut scheduler_config = SchedulerConfig::new(config.backup.state_path.clone());
    scheduler_config.interval = std::time::Duration::from_secs(config.backup.interval_secs);
    if let Some(url) = &config.backup.probe_url {
        scheduler_config.probe_url = url.clone();
    }
    let scheduler = Arc::new(BackupScheduler::new(engine.clone(), scheduler_config).await);
    if config.backup.enabled {
        scheduler.start().await.context("starting scheduler")?;
    } else {
        info!("🔕 Backups disabled, scheduler not started");
    }

    let assets = Arc::new(AssetStore::from_config(
        config.blob.token.clone(),
        config.blob.base_url.clone(),
        config.uploads_dir.clone(),
    ));

    let state = AppState {
        storage,
        engine,
        scheduler: scheduler.clone(),
        assets,
        auto_cloud_token: config.auto_cloud_token.clone(),
    };
    let app = bossnouadi_api::create_router(state);

    let addr = SocketAddr::new(config.address, config.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("🌐 Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    scheduler.stop().await;
    info!("👋 BossNouadi server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("❌ Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("🛑 Ctrl+C received, shutting down"),
        _ = terminate => info!("🛑 SIGTERM received, shutting down"),
    }
}
