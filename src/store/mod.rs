pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub items: sled::Tree,
    pub collection_items: sled::Tree,
    pub comparison_events: sled::Tree,
    pub slider_events: sled::Tree,
    pub favorite_events: sled::Tree,
    pub item_event_index: sled::Tree,
    pub item_states: sled::Tree,
    pub voter_states: sled::Tree,
    pub published_scores: sled::Tree,
    pub collection_indices: sled::Tree,
    pub dirty_queue: sled::Tree,
    pub batch_runs: sled::Tree,
    pub config_versions: sled::Tree,
    /// Serializes id assignment with insertion so readers never observe a
    /// higher event id before a lower one.
    append_lock: Mutex<()>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("CAS retry exhausted after {attempts} attempts: entity={entity}, key={key}")]
    CasRetryExhausted {
        entity: String,
        key: String,
        attempts: u32,
    },
    #[error("claim lost: item={item_id}")]
    ClaimLost { item_id: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl StoreError {
    /// Errors worth retrying with backoff: storage hiccups and optimistic
    /// concurrency losses.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Sled(_) | StoreError::Conflict { .. } | StoreError::CasRetryExhausted { .. }
        )
    }
}

impl From<TransactionError<StoreError>> for StoreError {
    fn from(error: TransactionError<StoreError>) -> Self {
        match error {
            TransactionError::Abort(store_error) => store_error,
            TransactionError::Storage(storage_error) => StoreError::Sled(storage_error),
        }
    }
}

pub(crate) fn abort(error: StoreError) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(error)
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let items = db.open_tree(trees::ITEMS)?;
        let collection_items = db.open_tree(trees::COLLECTION_ITEMS)?;
        let comparison_events = db.open_tree(trees::COMPARISON_EVENTS)?;
        let slider_events = db.open_tree(trees::SLIDER_EVENTS)?;
        let favorite_events = db.open_tree(trees::FAVORITE_EVENTS)?;
        let item_event_index = db.open_tree(trees::ITEM_EVENT_INDEX)?;
        let item_states = db.open_tree(trees::ITEM_STATES)?;
        let voter_states = db.open_tree(trees::VOTER_STATES)?;
        let published_scores = db.open_tree(trees::PUBLISHED_SCORES)?;
        let collection_indices = db.open_tree(trees::COLLECTION_INDICES)?;
        let dirty_queue = db.open_tree(trees::DIRTY_QUEUE)?;
        let batch_runs = db.open_tree(trees::BATCH_RUNS)?;
        let config_versions = db.open_tree(trees::CONFIG_VERSIONS)?;

        Ok(Self {
            db,
            items,
            collection_items,
            comparison_events,
            slider_events,
            favorite_events,
            item_event_index,
            item_states,
            voter_states,
            published_scores,
            collection_indices,
            dirty_queue,
            batch_runs,
            config_versions,
            append_lock: Mutex::new(()),
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn raw_db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
