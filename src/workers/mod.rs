pub mod batch_scoring;
pub mod collection_index;
pub mod retry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::WorkerConfig;
use crate::scoring::config::ScoringConfig;
use crate::scoring::engine::ScoringEngine;
use crate::store::Store;
use crate::workers::batch_scoring::BatchWorker;

/// Timeout for worker invocations that do not bound themselves (5 minutes).
const WORKER_TIMEOUT: Duration = Duration::from_secs(300);

/// Drain period before scheduler shutdown to let in-flight tasks complete.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    ScoreBatch,
    CollectionIndex,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScoreBatch => "score_batch",
            Self::CollectionIndex => "collection_index",
        }
    }

    /// How long one invocation may run before the scheduler drops it. A
    /// batch run must get past its soft cap so it can release its claims
    /// and record its report.
    pub fn timeout(self, config: &ScoringConfig) -> Duration {
        match self {
            Self::ScoreBatch => config.batch.run_deadline().max(WORKER_TIMEOUT),
            Self::CollectionIndex => WORKER_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: String,
    pub enabled: bool,
}

pub struct WorkerManager {
    store: Arc<Store>,
    engine: Arc<ScoringEngine>,
    batch_worker: Arc<BatchWorker>,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        engine: Arc<ScoringEngine>,
        batch_worker: Arc<BatchWorker>,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            engine,
            batch_worker,
            shutdown_rx,
            config: config.clone(),
        }
    }

    /// Single source of truth for all planned jobs and their cron schedules.
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.is_leader {
            return Vec::new();
        }

        vec![
            JobSpec {
                name: WorkerName::ScoreBatch,
                cron: self.config.batch_cron.clone(),
                enabled: true,
            },
            JobSpec {
                name: WorkerName::CollectionIndex,
                cron: self.config.collection_cron.clone(),
                enabled: true,
            },
        ]
    }

    /// Start the worker scheduler. Returns an error if the scheduler cannot be created or started.
    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.is_leader {
            tracing::info!("Worker leader disabled; skipping worker startup");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;

        self.register_jobs(&scheduler).await;

        scheduler.start().await?;

        tracing::info!("Worker manager started");
        let _ = self.shutdown_rx.recv().await;

        tracing::info!(
            "Worker manager shutting down, draining for {}s",
            DRAIN_TIMEOUT.as_secs()
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        let _ = scheduler.shutdown().await;
        Ok(())
    }

    /// Register all jobs with the scheduler, using `planned_jobs()` as the single source of truth.
    async fn register_jobs(&self, scheduler: &JobScheduler) {
        let specs = self.planned_jobs();

        for spec in &specs {
            if !spec.enabled {
                tracing::info!(name = spec.name.as_str(), "Skipping disabled worker");
                continue;
            }

            let name_str = spec.name.as_str();

            match spec.name {
                WorkerName::ScoreBatch => {
                    let worker = self.batch_worker.clone();
                    let engine = self.engine.clone();
                    add_job(scheduler, &spec.cron, name_str, move || {
                        let worker = worker.clone();
                        let engine = engine.clone();
                        async move {
                            let timeout = WorkerName::ScoreBatch.timeout(&engine.get_config().await);
                            run_bounded(WorkerName::ScoreBatch, timeout, async {
                                if let Err(e) = worker.run_batch().await {
                                    tracing::error!(error = %e, "score_batch failed");
                                }
                            })
                            .await;
                        }
                    })
                    .await;
                }
                WorkerName::CollectionIndex => {
                    let store = self.store.clone();
                    let engine = self.engine.clone();
                    add_job(scheduler, &spec.cron, name_str, move || {
                        let store = store.clone();
                        let engine = engine.clone();
                        async move {
                            let config = engine.get_config().await;
                            let timeout = WorkerName::CollectionIndex.timeout(&config);
                            run_bounded(WorkerName::CollectionIndex, timeout, async {
                                collection_index::run(&store, &config.collection).await;
                            })
                            .await;
                        }
                    })
                    .await;
                }
            }
            tracing::info!(name = name_str, cron = %spec.cron, "Registered worker");
        }
    }
}

/// Drop `fut` once `timeout` has passed.
async fn run_bounded<Fut>(name: WorkerName, timeout: Duration, fut: Fut)
where
    Fut: std::future::Future<Output = ()>,
{
    if tokio::time::timeout(timeout, fut).await.is_err() {
        tracing::error!(
            worker = name.as_str(),
            timeout_secs = timeout.as_secs(),
            "Worker timed out"
        );
    }
}

/// Add a job to the scheduler with an overlap guard. Each job bounds its own
/// run time through [`run_bounded`].
async fn add_job<Fut, F>(scheduler: &JobScheduler, cron: &str, name: &'static str, mut run: F)
where
    F: FnMut() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(false));

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let guard = running.clone();

        if guard
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(
                worker = name,
                "Skipping worker invocation: previous run still in progress"
            );
            return Box::pin(async {});
        }

        let fut = run();
        Box::pin(async move {
            fut.await;
            guard.store(false, Ordering::SeqCst);
        })
    });

    match job {
        Ok(job) => {
            if let Err(err) = scheduler.add(job).await {
                tracing::error!(error=%err, cron, worker = name, "Failed to add worker job");
            }
        }
        Err(err) => tracing::error!(error=%err, cron, worker = name, "Failed to create worker job"),
    }
}
