//! TeraSync Server: realtime hub and file distribution
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, fmt};

use terasync_api::AppState;
use terasync_auth::{JwtDecoder, JwtEncoder, PasswordHasher};
use terasync_cache::StoreManager;
use terasync_core::config::AppConfig;
use terasync_core::config::app::ServerRole;
use terasync_core::error::AppError;
use terasync_core::traits::notify::ReadyNotifier;
use terasync_queue::{AdmissionController, HttpReadyNotifier, QueueLimits, RequestQueue};
use terasync_realtime::bridge::build_bus;
use terasync_realtime::{HubReadyNotifier, RealtimeEngine, RealtimeServices};
use terasync_service::MemoryDirectory;
use terasync_storage::StorageManager;
use terasync_storage::origin::TokenSource;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {:#}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_path =
        std::env::var("TERASYNC_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

    let env = std::env::var("TERASYNC_ENV").unwrap_or_else(|_| "development".to_string());

    AppConfig::load(&config_path, &env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!(
        role = ?config.server.role,
        "Starting TeraSync v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = Arc::new(config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background: Vec<JoinHandle<()>> = Vec::new();

    // ── Step 1: Auth ─────────────────────────────────────────────
    let jwt_encoder = Arc::new(JwtEncoder::new(&config.auth));
    let jwt_decoder = Arc::new(JwtDecoder::new(&config.auth));

    let token: TokenSource = {
        let encoder = Arc::clone(&jwt_encoder);
        let shard = config.realtime.shard_name.clone();
        Arc::new(move || encoder.issue_service_token(&shard))
    };

    // ── Step 2: Blob storage ─────────────────────────────────────
    tracing::info!(
        "Initializing blob storage (origin: {})...",
        config.files.origin.kind
    );
    let storage = StorageManager::from_config(&config.files, Arc::clone(&token))
        .await
        .context("Storage init failed")?;
    let storage = Arc::new(storage);

    // ── Step 3: Request queue ────────────────────────────────────
    let queue = RequestQueue::new(QueueLimits::from(&config.files));

    // ── Step 4: Realtime hub (main role only) ────────────────────
    let realtime = match config.server.role {
        ServerRole::Main => {
            tracing::info!(
                "Initializing presence store (provider: {})...",
                config.presence.provider
            );
            let stores = StoreManager::new(&config.presence)
                .await
                .context("Presence store init failed")?;
            let bus = build_bus(&config.realtime, &stores).context("Shard bus init failed")?;
            let directory = Arc::new(MemoryDirectory::new());

            let engine = RealtimeEngine::new(
                &config,
                RealtimeServices {
                    store: stores.store(),
                    bus,
                    directory: directory.clone(),
                    uploads: directory,
                    hasher: Arc::new(PasswordHasher::new()),
                },
            );
            background.extend(
                engine
                    .start_background(shutdown_rx.clone())
                    .await
                    .context("Realtime background tasks failed to start")?,
            );
            tracing::info!(shard = %engine.shard_name(), "Realtime hub started");
            Some(engine)
        }
        ServerRole::Distribution => None,
    };

    // ── Step 5: Ready notifier + admission loop ──────────────────
    let notifier: Arc<dyn ReadyNotifier> = match config.files.notifier.kind.as_str() {
        "local" => {
            let engine = realtime.clone().ok_or_else(|| {
                AppError::configuration("files.notifier.kind = \"local\" requires server.role = \"main\"")
            })?;
            Arc::new(HubReadyNotifier::new(engine))
        }
        "http" => Arc::new(HttpReadyNotifier::new(
            &config.files.notifier.main_url,
            Duration::from_secs(config.files.notifier.timeout_seconds),
            Arc::clone(&token),
        )?),
        other => {
            return Err(AppError::configuration(format!(
                "Unknown ready notifier: '{other}'. Supported: local, http"
            ))
            .into());
        }
    };

    let admission = AdmissionController::new(
        queue.clone(),
        notifier,
        Duration::from_millis(config.files.admission_interval_ms.max(1)),
    );
    let admission_rx = shutdown_rx.clone();
    background.push(tokio::spawn(async move {
        admission.run(admission_rx).await;
    }));

    // ── Step 6: Build app ────────────────────────────────────────
    let state = AppState::new(
        Arc::clone(&config),
        jwt_decoder,
        storage,
        queue,
        realtime.clone(),
    );
    let app = terasync_api::build_app(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("TeraSync server listening on {}", addr);

    // ── Step 7: Graceful shutdown ────────────────────────────────
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown...");
        let _ = shutdown_tx.send(true);
    });

    server.await.context("Server error")?;

    // ── Step 8: Wait for background tasks ────────────────────────
    if let Some(engine) = &realtime {
        engine.shutdown().await;
    }

    tracing::info!("Waiting for background tasks to complete...");
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let drained = tokio::time::timeout(grace, join_background(background)).await;
    if drained.is_err() {
        tracing::warn!(grace_seconds = grace.as_secs(), "Background tasks did not stop in time");
    }

    tracing::info!("TeraSync server shut down gracefully");
    Ok(())
}

async fn join_background(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Background task panicked");
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
