use std::net::SocketAddr;
use std::sync::Arc;

use aesthetic_scoring::config::Config;
use aesthetic_scoring::constants::MIN_ADMIN_TOKEN_LEN;
use aesthetic_scoring::logging::{init_tracing, LogConfig};
use aesthetic_scoring::routes::build_router;
use aesthetic_scoring::scoring::config::ScoringConfig;
use aesthetic_scoring::scoring::engine::ScoringEngine;
use aesthetic_scoring::state::AppState;
use aesthetic_scoring::store::Store;
use aesthetic_scoring::workers::batch_scoring::BatchWorker;
use aesthetic_scoring::workers::WorkerManager;
use axum::http::{header, HeaderValue};
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    // Held for the life of the process; dropping it stops the file writer.
    let _log_guard = match init_tracing(&LogConfig::from(&config)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!("Starting aesthetic-scoring");

    let scoring_config = ScoringConfig::from_env(&config.scoring).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid scoring configuration");
        std::process::exit(1)
    });

    if !config.admin_token.is_empty() && config.admin_token.len() < MIN_ADMIN_TOKEN_LEN {
        tracing::warn!(
            min_len = MIN_ADMIN_TOKEN_LEN,
            "ADMIN_TOKEN is too short; admin API disabled"
        );
    }

    let store = Arc::new(Store::open(&config.sled_path).expect("Failed to open sled database"));
    store.run_migrations().expect("Failed to run migrations");

    // A config accepted through the admin API outlives restarts.
    let scoring_config = match store.latest_scoring_config() {
        Ok(Some(saved)) if saved.config.validate().is_ok() => {
            tracing::info!(version = saved.version, "Using persisted scoring config");
            saved.config
        }
        Ok(Some(saved)) => {
            tracing::warn!(version = saved.version, "Persisted scoring config is invalid, ignoring");
            scoring_config
        }
        Ok(None) => scoring_config,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read persisted scoring config");
            scoring_config
        }
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let engine = Arc::new(ScoringEngine::new(scoring_config, store.clone()));
    let batch_worker = Arc::new(BatchWorker::new(store.clone(), engine.clone()));

    let state = AppState::new(
        store.clone(),
        engine.clone(),
        batch_worker.clone(),
        &config,
        shutdown_tx.clone(),
    );

    let worker_handle = if config.worker.is_leader {
        let worker_manager = WorkerManager::new(
            store.clone(),
            engine.clone(),
            batch_worker.clone(),
            shutdown_tx.subscribe(),
            &config.worker,
        );
        Some(tokio::spawn(async move {
            if let Err(e) = worker_manager.start().await {
                tracing::error!(error = %e, "Worker manager failed");
            }
        }))
    } else {
        tracing::info!("Not the worker leader; scheduled scoring disabled on this node");
        None
    };

    let cors_layer = build_cors_layer(&config);

    // Listed outermost first.
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(SetResponseHeaderLayer::overriding(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(CatchPanicLayer::new())
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer),
    );

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");

    let server_future = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()));

    if let Some(handle) = worker_handle {
        // A panicking scheduler must not take the HTTP server down with it.
        tokio::spawn(async move {
            match handle.await {
                Err(e) => {
                    tracing::error!(error = %e, "Worker task panicked, HTTP server continues")
                }
                Ok(()) => tracing::info!("Worker manager exited normally"),
            }
        });
    }

    if let Err(e) = server_future.await {
        tracing::error!(error = %e, "HTTP server crashed");
    }

    tracing::info!("Flushing store before exit");
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Failed to flush store before exit");
    }
    tracing::info!("Shutdown complete");
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.cors_origin.trim() == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_credentials(false)
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
            .allow_methods(Any);
    }

    match config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
            .allow_methods(Any),
        Err(e) => {
            panic!(
                "FATAL: Invalid CORS_ORIGIN '{}': {}. \
                 Fix the CORS_ORIGIN environment variable.",
                config.cors_origin, e
            );
        }
    }
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
