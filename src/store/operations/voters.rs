use std::collections::HashMap;

use crate::scoring::types::VoterCalibration;
use crate::store::keys;
use crate::store::{Store, StoreError};

impl Store {
    pub fn get_voter(&self, voter_id: &str) -> Result<Option<VoterCalibration>, StoreError> {
        let key = keys::voter_key(voter_id)?;
        match self.voter_states.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Load each distinct voter once. Missing voters are absent from the map.
    pub fn get_voters_batch(
        &self,
        voter_ids: &[&str],
    ) -> Result<HashMap<String, VoterCalibration>, StoreError> {
        let mut voters = HashMap::with_capacity(voter_ids.len());
        for voter_id in voter_ids {
            if voters.contains_key(*voter_id) {
                continue;
            }
            if let Some(voter) = self.get_voter(voter_id)? {
                voters.insert(voter_id.to_string(), voter);
            }
        }
        Ok(voters)
    }

    pub fn count_voters(&self) -> usize {
        self.voter_states.len()
    }
}
