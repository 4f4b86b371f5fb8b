//! Batch scoring worker: claims dirty items and runs each through the engine.
//!
//! Items are processed one at a time with a small random pause in between so a
//! large backlog never saturates storage. Every item commits on its own, so a
//! run can stop at any point without leaving partial state behind.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::scoring::config::ScoringConfig;
use crate::scoring::engine::{ItemOutcome, ScoringEngine};
use crate::scoring::types::Priority;
use crate::scoring::ScoringError;
use crate::store::operations::batch_runs::{BatchReport, BatchTrigger};
use crate::store::operations::dirty_queue::Claim;
use crate::store::{Store, StoreError};
use crate::workers::retry::{retry_transient, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub trigger: BatchTrigger,
    pub limit: usize,
    pub min_priority: Priority,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub runs: u64,
    pub items_processed: u64,
    pub items_published: u64,
    pub item_errors: u64,
    pub priority_run_active: bool,
}

pub struct BatchWorker {
    store: Arc<Store>,
    engine: Arc<ScoringEngine>,
    priority_running: AtomicBool,
    runs: AtomicU64,
    items_processed: AtomicU64,
    items_published: AtomicU64,
    item_errors: AtomicU64,
}

/// Clears the priority flag even if the run panics.
struct PriorityGuard<'a>(&'a AtomicBool);

impl Drop for PriorityGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl BatchWorker {
    pub fn new(store: Arc<Store>, engine: Arc<ScoringEngine>) -> Self {
        Self {
            store,
            engine,
            priority_running: AtomicBool::new(false),
            runs: AtomicU64::new(0),
            items_processed: AtomicU64::new(0),
            items_published: AtomicU64::new(0),
            item_errors: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            runs: self.runs.load(Ordering::Relaxed),
            items_processed: self.items_processed.load(Ordering::Relaxed),
            items_published: self.items_published.load(Ordering::Relaxed),
            item_errors: self.item_errors.load(Ordering::Relaxed),
            priority_run_active: self.priority_running.load(Ordering::SeqCst),
        }
    }

    /// Scheduled run: up to `batch_size` items of any priority.
    pub async fn run_batch(&self) -> Result<BatchReport, ScoringError> {
        let limit = self.engine.get_config().await.batch.batch_size;
        self.run_with(BatchOptions {
            trigger: BatchTrigger::Scheduled,
            limit,
            min_priority: Priority::Low,
        })
        .await
    }

    /// Kick a small high-priority run in the background. Returns `false` if
    /// one is already in flight.
    pub fn trigger_priority(self: &Arc<Self>) -> bool {
        if self
            .priority_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Priority batch already running, not triggering another");
            return false;
        }

        let worker = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = PriorityGuard(&worker.priority_running);
            let limit = worker.engine.get_config().await.batch.priority_batch_size;
            let result = worker
                .run_with(BatchOptions {
                    trigger: BatchTrigger::Priority,
                    limit,
                    min_priority: Priority::High,
                })
                .await;
            if let Err(error) = result {
                tracing::warn!(error = %error, "Priority batch failed");
            }
        });
        true
    }

    pub async fn run_with(&self, options: BatchOptions) -> Result<BatchReport, ScoringError> {
        let config = self.engine.get_config().await;
        let batch = &config.batch;
        let policy = RetryPolicy::from_batch(batch);
        let soft_cap = Duration::from_secs(batch.soft_cap_secs);
        let claim_timeout = chrono::Duration::seconds(batch.claim_timeout_secs);
        let started = Instant::now();

        let mut report = BatchReport {
            run_id: Uuid::new_v4().to_string(),
            trigger: options.trigger,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            claimed: 0,
            processed: 0,
            published: 0,
            skipped_events: 0,
            errors: 0,
            stopped_early: false,
            failed: false,
        };

        tracing::info!(
            run_id = %report.run_id,
            trigger = ?options.trigger,
            limit = options.limit,
            "Batch scoring run started"
        );

        let mut first_item = true;
        // Items already claimed by this run, whatever the outcome.
        let mut handled = HashSet::new();
        while report.claimed < options.limit {
            if started.elapsed() >= soft_cap {
                report.stopped_early = true;
                tracing::info!(
                    run_id = %report.run_id,
                    claimed = report.claimed,
                    "Soft time cap reached, no further claims"
                );
                break;
            }

            let chunk = batch
                .claim_chunk_size
                .max(1)
                .min(options.limit - report.claimed);
            let exclude = &handled;
            let claims = retry_transient("claim_dirty", policy, move || async move {
                Ok(self.store.claim_dirty_excluding(
                    chunk,
                    options.min_priority,
                    claim_timeout,
                    exclude,
                )?)
            })
            .await?;
            if claims.is_empty() {
                break;
            }
            report.claimed += claims.len();
            handled.extend(claims.iter().map(|claim| claim.item_id.clone()));

            for claim in claims {
                if !first_item {
                    self.jitter(&config).await;
                }
                first_item = false;

                match self.process_claim(&claim, &config, policy).await {
                    Ok(outcome) => {
                        report.processed += 1;
                        report.skipped_events += outcome.fold.integrity_skipped;
                        if outcome.published {
                            report.published += 1;
                        }
                    }
                    Err(error) => {
                        report.errors += 1;
                        self.handle_failure(&claim, &error);
                    }
                }
            }
        }

        let attempted = report.processed + report.errors;
        report.failed =
            attempted > 0 && report.errors as f64 / attempted as f64 > batch.failure_ratio;
        report.finished_at = Utc::now();

        self.runs.fetch_add(1, Ordering::Relaxed);
        self.items_processed
            .fetch_add(report.processed as u64, Ordering::Relaxed);
        self.items_published
            .fetch_add(report.published as u64, Ordering::Relaxed);
        self.item_errors
            .fetch_add(report.errors as u64, Ordering::Relaxed);

        if let Err(error) = self.store.record_batch_run(&report) {
            tracing::warn!(run_id = %report.run_id, error = %error, "Failed to record batch run");
        }

        if report.failed {
            tracing::error!(
                run_id = %report.run_id,
                processed = report.processed,
                errors = report.errors,
                "Batch scoring run failed"
            );
        } else {
            tracing::info!(
                run_id = %report.run_id,
                claimed = report.claimed,
                processed = report.processed,
                published = report.published,
                errors = report.errors,
                skipped_events = report.skipped_events,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Batch scoring run complete"
            );
        }

        Ok(report)
    }

    async fn jitter(&self, config: &ScoringConfig) {
        let (min, max) = (config.batch.jitter_min_ms, config.batch.jitter_max_ms);
        if max == 0 {
            return;
        }
        let pause = rand::thread_rng().gen_range(min.min(max)..=max);
        tokio::time::sleep(Duration::from_millis(pause)).await;
    }

    async fn process_claim(
        &self,
        claim: &Claim,
        config: &ScoringConfig,
        policy: RetryPolicy,
    ) -> Result<ItemOutcome, ScoringError> {
        retry_transient("process_item", policy, move || self.process_once(claim, config)).await
    }

    async fn process_once(
        &self,
        claim: &Claim,
        config: &ScoringConfig,
    ) -> Result<ItemOutcome, ScoringError> {
        let engine = self.engine.clone();
        let owned_claim = claim.clone();
        let owned_config = config.clone();
        let timeout_ms = config.batch.item_timeout_ms;

        let task =
            tokio::task::spawn_blocking(move || engine.process_item(&owned_claim, &owned_config));

        match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ScoringError::Task(join_error.to_string())),
            Err(_) => Err(ScoringError::Timeout {
                item_id: claim.item_id.clone(),
                timeout_ms,
            }),
        }
    }

    /// Log the failure and hand the item back to the queue so a later run
    /// picks it up again.
    fn handle_failure(&self, claim: &Claim, error: &ScoringError) {
        if matches!(error, ScoringError::Store(StoreError::ClaimLost { .. })) {
            tracing::warn!(item_id = %claim.item_id, "Claim lost to another worker");
            return;
        }

        tracing::warn!(
            item_id = %claim.item_id,
            attempts = claim.attempts + 1,
            error = %error,
            "Item processing failed"
        );
        if let Err(release_error) =
            self.store
                .release_claim(&claim.item_id, &claim.token, &error.to_string())
        {
            tracing::error!(
                item_id = %claim.item_id,
                error = %release_error,
                "Failed to release claim; it will expire"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::scoring::types::ComparisonOutcome;

    fn fast_config() -> ScoringConfig {
        let mut cfg = ScoringConfig::default();
        cfg.batch.jitter_min_ms = 0;
        cfg.batch.jitter_max_ms = 0;
        cfg.batch.claim_chunk_size = 2;
        cfg
    }

    fn worker(dir: &tempfile::TempDir) -> (Arc<Store>, Arc<BatchWorker>) {
        let store = Arc::new(Store::open(dir.path().join("db").to_str().unwrap()).unwrap());
        let engine = Arc::new(ScoringEngine::new(fast_config(), store.clone()));
        (store.clone(), Arc::new(BatchWorker::new(store, engine)))
    }

    #[tokio::test]
    async fn empty_queue_yields_empty_report() {
        let dir = tempdir().unwrap();
        let (store, worker) = worker(&dir);

        let report = worker.run_batch().await.unwrap();
        assert_eq!(report.claimed, 0);
        assert_eq!(report.processed, 0);
        assert!(!report.failed);
        assert_eq!(store.recent_batch_runs(5).unwrap().len(), 1);
        assert_eq!(worker.stats().runs, 1);
    }

    #[tokio::test]
    async fn claims_in_chunks_up_to_limit() {
        let dir = tempdir().unwrap();
        let (store, worker) = worker(&dir);
        for item in ["a", "b", "c", "d", "e"] {
            store.register_item(item, "c1").unwrap();
            store.mark_dirty(item, Priority::Normal).unwrap();
        }

        let report = worker
            .run_with(BatchOptions {
                trigger: BatchTrigger::Manual,
                limit: 3,
                min_priority: Priority::Low,
            })
            .await
            .unwrap();
        assert_eq!(report.claimed, 3);
        assert_eq!(report.processed, 3);
        assert_eq!(store.dirty_queue_stats(chrono::Duration::minutes(15)).unwrap().depth, 2);
    }

    #[tokio::test]
    async fn priority_runs_only_take_high_items() {
        let dir = tempdir().unwrap();
        let (store, worker) = worker(&dir);
        for item in ["a", "b", "c"] {
            store.register_item(item, "c1").unwrap();
        }
        store
            .append_comparison("a", "b", ComparisonOutcome::ItemA, "v1", true)
            .unwrap();
        store.mark_dirty("a", Priority::High).unwrap();
        store.mark_dirty("c", Priority::Normal).unwrap();

        let report = worker
            .run_with(BatchOptions {
                trigger: BatchTrigger::Priority,
                limit: 10,
                min_priority: Priority::High,
            })
            .await
            .unwrap();
        assert_eq!(report.processed, 1);
        assert!(store.get_dirty_entry("a").unwrap().is_none());
        assert!(store.get_dirty_entry("c").unwrap().is_some());
    }

    #[tokio::test]
    async fn trigger_priority_is_single_flight() {
        let dir = tempdir().unwrap();
        let (_store, worker) = worker(&dir);

        worker.priority_running.store(true, Ordering::SeqCst);
        assert!(!worker.trigger_priority());

        worker.priority_running.store(false, Ordering::SeqCst);
        assert!(worker.trigger_priority());
        for _ in 0..100 {
            if !worker.stats().priority_run_active {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!worker.stats().priority_run_active);
    }
}
