use std::sync::Arc;

use tempfile::TempDir;

use aesthetic_scoring::scoring::config::ScoringConfig;
use aesthetic_scoring::scoring::engine::ScoringEngine;
use aesthetic_scoring::scoring::types::{ComparisonOutcome, Priority};
use aesthetic_scoring::store::Store;
use aesthetic_scoring::workers::batch_scoring::BatchWorker;

use super::app::test_scoring_config;

pub struct Pipeline {
    pub store: Arc<Store>,
    pub engine: Arc<ScoringEngine>,
    pub worker: Arc<BatchWorker>,
    _temp_dir: TempDir,
}

pub fn pipeline() -> Pipeline {
    pipeline_with(test_scoring_config())
}

pub fn pipeline_with(config: ScoringConfig) -> Pipeline {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(
        Store::open(temp_dir.path().join("pipeline.sled").to_str().unwrap()).expect("open store"),
    );
    store.run_migrations().expect("run migrations");
    let engine = Arc::new(ScoringEngine::new(config, store.clone()));
    let worker = Arc::new(BatchWorker::new(store.clone(), engine.clone()));
    Pipeline {
        store,
        engine,
        worker,
        _temp_dir: temp_dir,
    }
}

pub fn seed_items(store: &Store, collection_id: &str, item_ids: &[&str]) {
    for item_id in item_ids {
        store
            .register_item(item_id, collection_id)
            .expect("register item");
    }
}

/// `winner` beats `loser`, both marked dirty the way ingestion does it.
pub fn vote(store: &Store, winner: &str, loser: &str, voter: &str) {
    store
        .append_comparison(winner, loser, ComparisonOutcome::ItemA, voter, false)
        .expect("append comparison");
    store.mark_dirty(winner, Priority::Normal).expect("mark dirty");
    store.mark_dirty(loser, Priority::Normal).expect("mark dirty");
}

pub fn slider(store: &Store, item: &str, voter: &str, raw: f64) {
    store.append_slider(voter, item, raw).expect("append slider");
    store.mark_dirty(item, Priority::Normal).expect("mark dirty");
}

/// Enough signal on `target` to clear every default publish minimum:
/// 5 comparisons against 3 distinct opponents and 2 sliders from 2 raters.
pub fn seed_publishable(store: &Store, target: &str, opponents: &[&str; 3]) {
    vote(store, target, opponents[0], "v1");
    vote(store, target, opponents[1], "v2");
    vote(store, opponents[2], target, "v3");
    vote(store, target, opponents[0], "v4");
    vote(store, target, opponents[1], "v5");
    slider(store, target, "r1", 80.0);
    slider(store, target, "r2", 70.0);
}
