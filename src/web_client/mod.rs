//! rapport-web: HTTP and WebSocket front end.
//!
//! Exposes the REST API for accounts, friendships, notifications and direct
//! messages, plus a WebSocket endpoint for presence and realtime delivery.
//! State lives in SQLite under the data directory.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use crate::crypto::PasswordHasher;
use crate::mailer::{LogMailer, Mailer, RetryingMailer};
use crate::storage::{db_path, Storage};
use crate::uploads::LocalUploader;

use config::{Cli, Config, SESSION_PURGE_INTERVAL_SECS};
use state::{AppState, SharedState};

/// Entry point: parse CLI, open storage, start server.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    crate::logging::init(&config.log_filter);

    tracing::info!("rapport-web starting");
    tracing::info!("  data directory: {}", config.data_dir.display());

    let db = db_path(&config.data_dir);
    let storage = Arc::new(
        Storage::open(&db).with_context(|| format!("failed to open {}", db.display()))?,
    );
    tracing::info!("  database: {}", db.display());

    let uploads = LocalUploader::new(config.uploads_dir());
    tracing::info!("  uploads: {}", uploads.root().display());

    let mailer: Arc<dyn Mailer> = Arc::new(RetryingMailer::new(LogMailer));

    let state: SharedState = Arc::new(AppState::new(
        storage,
        PasswordHasher::new(),
        mailer,
        uploads,
        config.session_ttl_secs,
        Duration::from_secs(config.upload_timeout_secs),
    ));

    let purge_state = Arc::clone(&state);
    tokio::spawn(async move {
        session_purge_loop(purge_state).await;
    });

    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("rapport-web listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("rapport-web stopped");
    Ok(())
}

/// Periodically drop sessions past their expiry.
async fn session_purge_loop(state: SharedState) {
    let mut interval = tokio::time::interval(Duration::from_secs(SESSION_PURGE_INTERVAL_SECS));
    loop {
        interval.tick().await;
        match state.identity.purge_expired_sessions(utils::now_secs()) {
            Ok(0) => {}
            Ok(n) => tracing::info!("sessions: purged {n} expired"),
            Err(e) => tracing::warn!("sessions: purge failed: {e}"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
