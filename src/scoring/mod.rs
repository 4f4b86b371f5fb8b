pub mod calibration;
pub mod collection;
pub mod composer;
pub mod config;
pub mod elo;
pub mod engine;
pub mod publish_gate;
pub mod reliability;
pub mod types;

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid scoring config: {0}")]
    Config(String),
    #[error("item {item_id} timed out after {timeout_ms}ms")]
    Timeout { item_id: String, timeout_ms: u64 },
    #[error("worker task failed: {0}")]
    Task(String),
}

impl ScoringError {
    /// Whether an immediate retry of the same operation can succeed. A timed
    /// out item may still be running on the blocking pool, so it is released
    /// rather than retried.
    pub fn is_transient(&self) -> bool {
        match self {
            ScoringError::Store(error) => error.is_transient(),
            ScoringError::Config(_)
            | ScoringError::Timeout { .. }
            | ScoringError::Task(_) => false,
        }
    }
}
