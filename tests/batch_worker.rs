mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use aesthetic_scoring::scoring::engine::ScoringEngine;
use aesthetic_scoring::scoring::types::{ComparisonOutcome, Priority, PublishState};
use aesthetic_scoring::store::operations::batch_runs::BatchTrigger;
use aesthetic_scoring::store::{trees, Store};
use aesthetic_scoring::workers::batch_scoring::{BatchOptions, BatchWorker};

use common::app::test_scoring_config;
use common::fixtures::{pipeline, pipeline_with, seed_items, seed_publishable, slider, vote};

fn manual(limit: usize) -> BatchOptions {
    BatchOptions {
        trigger: BatchTrigger::Manual,
        limit,
        min_priority: Priority::Low,
    }
}

#[tokio::test]
async fn it_first_publish_requires_all_minimums() {
    let p = pipeline();
    seed_items(&p.store, "c1", &["target", "o1", "o2", "o3"]);
    seed_publishable(&p.store, "target", &["o1", "o2", "o3"]);

    let report = p.worker.run_with(manual(50)).await.unwrap();
    assert_eq!(report.errors, 0);
    assert_eq!(report.processed, 4);
    assert!(!report.failed);

    let target = p.store.get_published_score("target").unwrap().unwrap();
    assert!(target.is_published());
    assert_eq!(target.vote_count, 7);
    assert!(target.published_at.is_some());

    // Opponents have comparisons but no sliders, so the gate holds them back.
    for opponent in ["o1", "o2", "o3"] {
        let score = p.store.get_published_score(opponent).unwrap();
        assert!(score.map(|s| !s.is_published()).unwrap_or(true));
    }

    let state = p.store.get_item_state("target").unwrap().unwrap();
    assert_eq!(state.total_comparisons, 5);
    assert_eq!(state.distinct_opponents.len(), 3);
    assert_eq!(state.total_slider_ratings, 2);
    assert_eq!(state.distinct_slider_raters.len(), 2);

    let stats = p
        .store
        .dirty_queue_stats(chrono::Duration::seconds(900))
        .unwrap();
    assert_eq!(stats.depth, 0);
}

#[tokio::test]
async fn it_four_comparisons_do_not_publish() {
    let p = pipeline();
    seed_items(&p.store, "c1", &["target", "o1", "o2", "o3"]);
    vote(&p.store, "target", "o1", "v1");
    vote(&p.store, "target", "o2", "v2");
    vote(&p.store, "o3", "target", "v3");
    vote(&p.store, "target", "o1", "v4");
    slider(&p.store, "target", "r1", 80.0);
    slider(&p.store, "target", "r2", 70.0);

    p.worker.run_with(manual(50)).await.unwrap();

    let state = p.store.get_item_state("target").unwrap().unwrap();
    assert_eq!(state.total_comparisons, 4);
    let score = p.store.get_published_score("target").unwrap();
    assert!(score.map(|s| s.state == PublishState::Unscored).unwrap_or(true));
}

#[tokio::test]
async fn it_reprocessing_without_new_events_is_a_no_op() {
    let p = pipeline();
    seed_items(&p.store, "c1", &["target", "o1", "o2", "o3"]);
    seed_publishable(&p.store, "target", &["o1", "o2", "o3"]);
    p.worker.run_with(manual(50)).await.unwrap();

    let before = p.store.get_item_state("target").unwrap().unwrap();
    let published_before = p.store.get_published_score("target").unwrap().unwrap();

    p.store.mark_dirty("target", Priority::Normal).unwrap();
    let report = p.worker.run_with(manual(50)).await.unwrap();
    assert_eq!(report.processed, 1);

    let after = p.store.get_item_state("target").unwrap().unwrap();
    assert_eq!(after.rating_mean, before.rating_mean);
    assert_eq!(after.rating_uncertainty, before.rating_uncertainty);
    assert_eq!(after.total_comparisons, before.total_comparisons);
    assert_eq!(after.total_slider_ratings, before.total_slider_ratings);
    assert_eq!(after.last_comparison_event_id, before.last_comparison_event_id);
    assert_eq!(after.version, before.version);

    let published_after = p.store.get_published_score("target").unwrap().unwrap();
    assert_eq!(published_after.score, published_before.score);
    assert_eq!(published_after.published_at, published_before.published_at);
}

#[tokio::test]
async fn it_new_events_after_publish_are_folded_once() {
    let p = pipeline();
    seed_items(&p.store, "c1", &["target", "o1", "o2", "o3"]);
    seed_publishable(&p.store, "target", &["o1", "o2", "o3"]);
    p.worker.run_with(manual(50)).await.unwrap();

    vote(&p.store, "target", "o3", "v9");
    p.worker.run_with(manual(50)).await.unwrap();
    p.store.mark_dirty("target", Priority::Normal).unwrap();
    p.worker.run_with(manual(50)).await.unwrap();

    let state = p.store.get_item_state("target").unwrap().unwrap();
    assert_eq!(state.total_comparisons, 6);
}

/// Shift the item's last publication and its queue deferral into the past.
fn backdate(store: &Store, item_id: &str, by: Duration) {
    let db = store.raw_db();

    let mut score = store.get_published_score(item_id).unwrap().unwrap();
    score.published_at = score.published_at.map(|at| at - by);
    db.open_tree(trees::PUBLISHED_SCORES)
        .unwrap()
        .insert(item_id, serde_json::to_vec(&score).unwrap())
        .unwrap();

    let mut entry = store.get_dirty_entry(item_id).unwrap().unwrap();
    entry.not_before = entry.not_before.map(|at| at - by);
    db.open_tree(trees::DIRTY_QUEUE)
        .unwrap()
        .insert(item_id, serde_json::to_vec(&entry).unwrap())
        .unwrap();
}

#[tokio::test]
async fn it_change_inside_grace_period_waits_for_a_later_run() {
    let mut config = test_scoring_config();
    config.publish_gate.score_delta_threshold = 0.0;
    let grace = Duration::minutes(config.publish_gate.grace_period_minutes);
    let p = pipeline_with(config);
    seed_items(&p.store, "c1", &["target", "o1", "o2", "o3"]);
    seed_publishable(&p.store, "target", &["o1", "o2", "o3"]);
    p.worker.run_with(manual(50)).await.unwrap();
    let first = p.store.get_published_score("target").unwrap().unwrap();

    vote(&p.store, "target", "o3", "v9");
    let held = p.worker.run_with(manual(50)).await.unwrap();
    assert_eq!(held.claimed, 2);
    assert_eq!(held.processed, 2);
    assert_eq!(held.published, 0);

    let stale = p.store.get_published_score("target").unwrap().unwrap();
    assert_eq!(stale.state, PublishState::StalePendingRepublish);
    assert_eq!(stale.score, first.score);
    let entry = p.store.get_dirty_entry("target").unwrap().unwrap();
    assert_eq!(entry.priority, Priority::Low);
    assert!(entry.claim_token.is_none());
    assert!(entry.not_before.unwrap() > Utc::now());

    let idle = p.worker.run_with(manual(50)).await.unwrap();
    assert_eq!(idle.claimed, 0);
    assert!(p.store.get_dirty_entry("target").unwrap().is_some());

    backdate(&p.store, "target", grace + Duration::minutes(1));
    let later = p.worker.run_with(manual(50)).await.unwrap();
    assert_eq!(later.claimed, 1);
    assert_eq!(later.published, 1);

    let republished = p.store.get_published_score("target").unwrap().unwrap();
    assert!(republished.is_published());
    assert_ne!(republished.state, PublishState::StalePendingRepublish);
    assert_ne!(republished.score, first.score);
    assert!(p.store.get_dirty_entry("target").unwrap().is_none());
}

#[tokio::test]
async fn it_super_vote_uses_double_k_and_extra_weight() {
    let p = pipeline();
    seed_items(&p.store, "c1", &["a", "b"]);
    p.store
        .append_comparison("a", "b", ComparisonOutcome::ItemA, "voter", true)
        .unwrap();
    // Only the winner is processed so the opponent stays at its initial rating.
    p.store.mark_dirty("a", Priority::High).unwrap();

    p.worker.run_with(manual(10)).await.unwrap();

    let config = test_scoring_config();
    let state = p.store.get_item_state("a").unwrap().unwrap();
    let expected_gain = config.elo.k_factor * config.elo.super_vote_k_multiplier * 0.5;
    assert!((state.rating_mean - (config.elo.initial_rating + expected_gain)).abs() < 1e-9);
    assert_eq!(
        state.total_comparisons,
        u64::from(config.elo.super_vote_weight)
    );
}

#[tokio::test]
async fn it_slider_bias_is_normalized_per_voter() {
    let p = pipeline();
    seed_items(&p.store, "c1", &["x", "y", "z"]);
    // A generous voter: everything lands in the 80s.
    slider(&p.store, "x", "generous", 80.0);
    slider(&p.store, "y", "generous", 85.0);
    slider(&p.store, "z", "generous", 90.0);

    p.worker.run_with(manual(10)).await.unwrap();

    let voter = p.store.get_voter("generous").unwrap().unwrap();
    assert_eq!(voter.slider_sample_count, 3);
    assert!((voter.slider_mean - 85.0).abs() < 1e-9);
}

#[tokio::test]
async fn it_failed_item_does_not_block_the_rest() {
    let p = pipeline();
    seed_items(&p.store, "c1", &["good-1", "good-2", "broken"]);
    slider(&p.store, "good-1", "r1", 60.0);
    slider(&p.store, "good-2", "r2", 60.0);
    slider(&p.store, "broken", "r3", 60.0);

    // Corrupt the stored rating state so loading it fails.
    let tree = p.store.raw_db().open_tree("item_states").unwrap();
    tree.insert("broken", b"not json".to_vec()).unwrap();

    let report = p.worker.run_with(manual(50)).await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.errors, 1);
    assert!(!report.failed);

    let entry = p.store.get_dirty_entry("broken").unwrap().unwrap();
    assert!(entry.claim_token.is_none());
    assert_eq!(entry.attempts, 1);
    assert!(entry.last_error.is_some());

    assert!(p.store.get_dirty_entry("good-1").unwrap().is_none());
    assert!(p.store.get_item_state("good-2").unwrap().is_some());
}

#[tokio::test]
async fn it_run_is_marked_failed_when_most_items_fail() {
    let p = pipeline();
    seed_items(&p.store, "c1", &["broken-1", "broken-2", "fine"]);
    for item in ["broken-1", "broken-2", "fine"] {
        slider(&p.store, item, "r", 50.0);
    }
    let tree = p.store.raw_db().open_tree("item_states").unwrap();
    tree.insert("broken-1", b"{".to_vec()).unwrap();
    tree.insert("broken-2", b"{".to_vec()).unwrap();

    let report = p.worker.run_with(manual(50)).await.unwrap();
    assert_eq!(report.errors, 2);
    assert!(report.failed);

    let runs = p.store.recent_batch_runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].failed);
}

#[tokio::test]
async fn it_unregistered_dirty_item_is_dropped() {
    let p = pipeline();
    p.store.mark_dirty("ghost", Priority::Normal).unwrap();

    let report = p.worker.run_with(manual(10)).await.unwrap();
    assert_eq!(report.errors, 0);
    assert!(p.store.get_dirty_entry("ghost").unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn it_concurrent_workers_never_process_an_item_twice() {
    let p = pipeline();
    let ids: Vec<String> = (0..24).map(|i| format!("item-{i}")).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    seed_items(&p.store, "c1", &refs);
    for (i, id) in ids.iter().enumerate() {
        slider(&p.store, id, &format!("rater-{i}"), 40.0 + i as f64);
    }

    let engine = Arc::new(ScoringEngine::new(test_scoring_config(), p.store.clone()));
    let other = Arc::new(BatchWorker::new(p.store.clone(), engine));

    let (left, right) = tokio::join!(p.worker.run_with(manual(100)), other.run_with(manual(100)));
    let (left, right) = (left.unwrap(), right.unwrap());

    assert_eq!(left.errors + right.errors, 0);
    assert_eq!(left.processed + right.processed, ids.len());

    for id in &ids {
        let state = p.store.get_item_state(id).unwrap().unwrap();
        assert_eq!(state.total_slider_ratings, 1);
        assert!(p.store.get_dirty_entry(id).unwrap().is_none());
    }
}

#[tokio::test]
async fn it_min_priority_leaves_lower_items_queued() {
    let mut config = test_scoring_config();
    config.batch.claim_chunk_size = 3;
    let p = pipeline_with(config);
    seed_items(&p.store, "c1", &["urgent", "routine"]);
    slider(&p.store, "routine", "r1", 50.0);
    p.store
        .append_slider("r2", "urgent", 50.0)
        .unwrap();
    p.store.mark_dirty("urgent", Priority::High).unwrap();

    let report = p
        .worker
        .run_with(BatchOptions {
            trigger: BatchTrigger::Priority,
            limit: 10,
            min_priority: Priority::High,
        })
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert!(p.store.get_dirty_entry("urgent").unwrap().is_none());
    assert!(p.store.get_dirty_entry("routine").unwrap().is_some());
}
