use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use aesthetic_scoring::config::{Config, ScoringEnvConfig, WorkerConfig};
use aesthetic_scoring::routes::build_router;
use aesthetic_scoring::scoring::config::ScoringConfig;
use aesthetic_scoring::scoring::engine::ScoringEngine;
use aesthetic_scoring::state::AppState;
use aesthetic_scoring::store::Store;
use aesthetic_scoring::workers::batch_scoring::BatchWorker;

pub const TEST_ADMIN_TOKEN: &str = "integration-test-admin-token-0123456789";

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

/// Default scoring config without the inter-item pause, so batch runs in
/// tests finish immediately.
pub fn test_scoring_config() -> ScoringConfig {
    let mut config = ScoringConfig::default();
    config.batch.jitter_min_ms = 0;
    config.batch.jitter_max_ms = 0;
    config
}

pub async fn spawn_test_server() -> TestApp {
    spawn_with(test_scoring_config(), false).await
}

pub async fn spawn_with(scoring: ScoringConfig, enable_priority_trigger: bool) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("scoring-test.sled");

    // Built directly instead of through set_var to keep parallel tests isolated.
    let config = Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: sled_path.to_string_lossy().to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        admin_token: TEST_ADMIN_TOKEN.to_string(),
        worker: WorkerConfig {
            is_leader: false,
            batch_cron: "0 0 * * * *".to_string(),
            collection_cron: "0 30 * * * *".to_string(),
            enable_priority_trigger,
        },
        scoring: ScoringEnvConfig::default(),
    };

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let engine = Arc::new(ScoringEngine::new(scoring, store.clone()));
    let batch_worker = Arc::new(BatchWorker::new(store.clone(), engine.clone()));
    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let state = AppState::new(store, engine, batch_worker, &config, shutdown_tx);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}

pub fn admin_header() -> (&'static str, String) {
    ("authorization", format!("Bearer {TEST_ADMIN_TOKEN}"))
}
