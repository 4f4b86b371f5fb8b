//! Atomic write-back of one processed item.

use sled::Transactional;

use crate::scoring::types::{ItemRatingState, PublishedScore, VoterCalibration};
use crate::store::operations::dirty_queue::DirtyEntry;
use crate::store::{abort, keys};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone)]
pub struct VoterWrite {
    pub voter: VoterCalibration,
    /// Version observed at load; `None` if the voter did not exist yet.
    pub loaded_version: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ItemCommit {
    pub item_id: String,
    pub claim_token: String,
    /// New item state; `None` when nothing was folded.
    pub state: Option<ItemRatingState>,
    pub loaded_version: Option<u64>,
    pub voters: Vec<VoterWrite>,
    pub published: Option<PublishedScore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    /// Dirty entry removed.
    Completed,
    /// Events arrived while claimed; the entry stays queued.
    Requeued,
}

fn stored_version<T, F>(raw: Option<&[u8]>, version_of: F) -> Result<Option<u64>, StoreError>
where
    T: serde::de::DeserializeOwned,
    F: Fn(&T) -> u64,
{
    match raw {
        Some(bytes) => {
            let value: T = serde_json::from_slice(bytes)?;
            Ok(Some(version_of(&value)))
        }
        None => Ok(None),
    }
}

impl Store {
    /// Persist item state, touched voters, the published record and the claim
    /// release in one transaction. Aborts with `ClaimLost` if the claim token
    /// no longer matches, and with `Conflict` if the item or any voter changed
    /// since it was loaded. Written records get their version bumped.
    pub fn commit_item_outcome(&self, commit: &ItemCommit) -> Result<CommitStatus, StoreError> {
        let item_key = keys::item_key(&commit.item_id)?;

        let state_bytes = match &commit.state {
            Some(state) => {
                let mut next = state.clone();
                next.version = commit.loaded_version.unwrap_or(0) + 1;
                Some(Self::serialize(&next)?)
            }
            None => None,
        };

        let mut voter_writes = Vec::with_capacity(commit.voters.len());
        for write in &commit.voters {
            let mut next = write.voter.clone();
            next.version = write.loaded_version.unwrap_or(0) + 1;
            voter_writes.push((
                keys::voter_key(&write.voter.voter_id)?,
                write.loaded_version,
                Self::serialize(&next)?,
            ));
        }

        let published_bytes = commit
            .published
            .as_ref()
            .map(Self::serialize)
            .transpose()?;

        let status = (
            &self.item_states,
            &self.voter_states,
            &self.published_scores,
            &self.dirty_queue,
        )
            .transaction(|(tx_items, tx_voters, tx_published, tx_dirty)| {
                let entry_raw = tx_dirty.get(item_key.as_bytes())?;
                let mut entry: DirtyEntry = match entry_raw {
                    Some(raw) => serde_json::from_slice(&raw).map_err(|e| abort(e.into()))?,
                    None => {
                        return Err(abort(StoreError::ClaimLost {
                            item_id: commit.item_id.clone(),
                        }))
                    }
                };
                if entry.claim_token.as_deref() != Some(commit.claim_token.as_str()) {
                    return Err(abort(StoreError::ClaimLost {
                        item_id: commit.item_id.clone(),
                    }));
                }

                if let Some(bytes) = &state_bytes {
                    let current = tx_items.get(item_key.as_bytes())?;
                    let current_version = stored_version(current.as_deref(), |s: &ItemRatingState| {
                        s.version
                    })
                    .map_err(abort)?;
                    if current_version != commit.loaded_version {
                        return Err(abort(StoreError::Conflict {
                            entity: "item_state".to_string(),
                            key: item_key.clone(),
                        }));
                    }
                    tx_items.insert(item_key.as_bytes(), bytes.as_slice())?;
                }

                for (voter_key, loaded_version, bytes) in &voter_writes {
                    let current = tx_voters.get(voter_key.as_bytes())?;
                    let current_version =
                        stored_version(current.as_deref(), |v: &VoterCalibration| v.version)
                            .map_err(abort)?;
                    if current_version != *loaded_version {
                        return Err(abort(StoreError::Conflict {
                            entity: "voter_state".to_string(),
                            key: voter_key.clone(),
                        }));
                    }
                    tx_voters.insert(voter_key.as_bytes(), bytes.as_slice())?;
                }

                if let Some(bytes) = &published_bytes {
                    tx_published.insert(item_key.as_bytes(), bytes.as_slice())?;
                }

                if entry.redirty {
                    entry.claim_token = None;
                    entry.claimed_at = None;
                    entry.redirty = false;
                    entry.attempts = 0;
                    entry.last_error = None;
                    let entry_bytes = serde_json::to_vec(&entry).map_err(|e| abort(e.into()))?;
                    tx_dirty.insert(item_key.as_bytes(), entry_bytes)?;
                    Ok(CommitStatus::Requeued)
                } else {
                    tx_dirty.remove(item_key.as_bytes())?;
                    Ok(CommitStatus::Completed)
                }
            })?;

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;
    use crate::scoring::config::ScoringConfig;
    use crate::scoring::types::Priority;

    fn open() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        (dir, store)
    }

    fn claim(store: &Store, item_id: &str) -> String {
        store.mark_dirty(item_id, Priority::Normal).unwrap();
        store
            .claim_dirty(1, Priority::Low, Duration::minutes(15))
            .unwrap()
            .remove(0)
            .token
    }

    fn commit_for(item_id: &str, token: &str, loaded_version: Option<u64>) -> ItemCommit {
        let cfg = ScoringConfig::default();
        ItemCommit {
            item_id: item_id.to_string(),
            claim_token: token.to_string(),
            state: Some(ItemRatingState::new(item_id, &cfg.elo, &cfg.reliability)),
            loaded_version,
            voters: vec![VoterWrite {
                voter: VoterCalibration::new("v1", &cfg.reliability),
                loaded_version: None,
            }],
            published: None,
        }
    }

    #[test]
    fn commit_writes_everything_and_clears_claim() {
        let (_dir, store) = open();
        let token = claim(&store, "i1");

        let status = store
            .commit_item_outcome(&commit_for("i1", &token, None))
            .unwrap();
        assert_eq!(status, CommitStatus::Completed);
        assert_eq!(store.get_item_state("i1").unwrap().unwrap().version, 1);
        assert_eq!(store.get_voter("v1").unwrap().unwrap().version, 1);
        assert!(store.get_dirty_entry("i1").unwrap().is_none());
    }

    #[test]
    fn stale_token_is_fenced_out() {
        let (_dir, store) = open();
        claim(&store, "i1");

        let err = store
            .commit_item_outcome(&commit_for("i1", "someone-else", None))
            .unwrap_err();
        assert!(matches!(err, StoreError::ClaimLost { .. }));
        assert!(store.get_item_state("i1").unwrap().is_none());
    }

    #[test]
    fn concurrent_voter_update_conflicts() {
        let (_dir, store) = open();
        let cfg = ScoringConfig::default();
        let mut voter = VoterCalibration::new("v1", &cfg.reliability);
        voter.version = 3;
        store
            .voter_states
            .insert("v1", Store::serialize(&voter).unwrap())
            .unwrap();

        let token = claim(&store, "i1");
        let err = store
            .commit_item_outcome(&commit_for("i1", &token, None))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(err.is_transient());
        // Claim is still held, nothing else was written.
        assert!(store.get_dirty_entry("i1").unwrap().unwrap().claim_token.is_some());
        assert!(store.get_item_state("i1").unwrap().is_none());
    }

    #[test]
    fn redirty_keeps_the_entry_queued() {
        let (_dir, store) = open();
        let token = claim(&store, "i1");
        store.mark_dirty("i1", Priority::High).unwrap();

        let status = store
            .commit_item_outcome(&commit_for("i1", &token, None))
            .unwrap();
        assert_eq!(status, CommitStatus::Requeued);
        let entry = store.get_dirty_entry("i1").unwrap().unwrap();
        assert!(entry.claim_token.is_none());
        assert_eq!(entry.priority, Priority::High);
    }
}
