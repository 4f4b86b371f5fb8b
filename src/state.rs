use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::scoring::engine::ScoringEngine;
use crate::store::Store;
use crate::workers::batch_scoring::BatchWorker;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    engine: Arc<ScoringEngine>,
    batch_worker: Arc<BatchWorker>,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        engine: Arc<ScoringEngine>,
        batch_worker: Arc<BatchWorker>,
        config: &Config,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            store,
            engine,
            batch_worker,
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn engine(&self) -> &Arc<ScoringEngine> {
        &self.engine
    }

    pub fn batch_worker(&self) -> &Arc<BatchWorker> {
        &self.batch_worker
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
