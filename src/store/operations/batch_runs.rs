use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchTrigger {
    Scheduled,
    Priority,
    Manual,
}

/// Outcome of one batch run, persisted for the admin queue view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub run_id: String,
    pub trigger: BatchTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub claimed: usize,
    pub processed: usize,
    pub published: usize,
    pub skipped_events: usize,
    pub errors: usize,
    /// Soft wall-clock cap reached before `batch_size` items were claimed.
    pub stopped_early: bool,
    pub failed: bool,
}

impl Store {
    pub fn record_batch_run(&self, report: &BatchReport) -> Result<(), StoreError> {
        let key = keys::batch_run_key(report.started_at.timestamp_millis(), &report.run_id);
        self.batch_runs
            .insert(key.as_bytes(), Self::serialize(report)?)?;
        Ok(())
    }

    /// Most recent runs first.
    pub fn recent_batch_runs(&self, limit: usize) -> Result<Vec<BatchReport>, StoreError> {
        let mut reports = Vec::with_capacity(limit);
        for entry in self.batch_runs.iter().take(limit) {
            let (_, raw) = entry?;
            reports.push(Self::deserialize(&raw)?);
        }
        Ok(reports)
    }
}
