use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionResult;

use crate::scoring::config::ScoringConfig;
use crate::store::{abort, keys};
use crate::store::{Store, StoreError};

const CONFIG_TYPE: &str = "scoring";

/// One accepted runtime reload of the scoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringConfigVersion {
    pub version: u32,
    pub config: ScoringConfig,
    pub saved_at: DateTime<Utc>,
}

impl Store {
    /// Append `config` to the history and make it the latest version.
    pub fn save_scoring_config(
        &self,
        config: &ScoringConfig,
    ) -> Result<ScoringConfigVersion, StoreError> {
        let latest_key = keys::config_latest_key(CONFIG_TYPE);
        let saved = self.config_versions.transaction(
            |tx| -> ConflictableTransactionResult<ScoringConfigVersion, StoreError> {
                let version = match tx.get(latest_key.as_bytes())? {
                    Some(raw) => {
                        let previous: ScoringConfigVersion =
                            Self::deserialize(&raw).map_err(abort)?;
                        previous.version + 1
                    }
                    None => 1,
                };
                let record = ScoringConfigVersion {
                    version,
                    config: config.clone(),
                    saved_at: Utc::now(),
                };
                let bytes = Self::serialize(&record).map_err(abort)?;
                tx.insert(
                    keys::config_version_key(CONFIG_TYPE, version).as_bytes(),
                    bytes.clone(),
                )?;
                tx.insert(latest_key.as_bytes(), bytes)?;
                Ok(record)
            },
        )?;
        Ok(saved)
    }

    pub fn latest_scoring_config(&self) -> Result<Option<ScoringConfigVersion>, StoreError> {
        let key = keys::config_latest_key(CONFIG_TYPE);
        match self.config_versions.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn versions_increase_and_latest_tracks_last_save() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        assert!(store.latest_scoring_config().unwrap().is_none());

        let first = store.save_scoring_config(&ScoringConfig::default()).unwrap();
        let mut changed = ScoringConfig::default();
        changed.batch.batch_size = 42;
        let second = store.save_scoring_config(&changed).unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        let latest = store.latest_scoring_config().unwrap().unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.config.batch.batch_size, 42);
    }
}
