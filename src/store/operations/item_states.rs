use crate::scoring::types::{ItemRatingState, PublishedScore};
use crate::store::keys;
use crate::store::{Store, StoreError};

impl Store {
    pub fn get_item_state(&self, item_id: &str) -> Result<Option<ItemRatingState>, StoreError> {
        let key = keys::item_key(item_id)?;
        match self.item_states.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Unfenced write, for seeding and repair tooling. The batch path goes
    /// through `commit_item_outcome`.
    pub fn put_item_state(&self, state: &ItemRatingState) -> Result<(), StoreError> {
        let key = keys::item_key(&state.item_id)?;
        self.item_states
            .insert(key.as_bytes(), Self::serialize(state)?)?;
        Ok(())
    }

    pub fn get_published_score(&self, item_id: &str) -> Result<Option<PublishedScore>, StoreError> {
        let key = keys::item_key(item_id)?;
        match self.published_scores.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_published_scores(
        &self,
        item_ids: &[String],
    ) -> Result<Vec<PublishedScore>, StoreError> {
        let mut scores = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            if let Some(score) = self.get_published_score(item_id)? {
                scores.push(score);
            }
        }
        Ok(scores)
    }
}
