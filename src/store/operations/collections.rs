use crate::scoring::types::CollectionIndex;
use crate::store::keys;
use crate::store::{Store, StoreError};

impl Store {
    pub fn put_collection_index(&self, index: &CollectionIndex) -> Result<(), StoreError> {
        let key = keys::collection_index_key(&index.collection_id)?;
        self.collection_indices
            .insert(key.as_bytes(), Self::serialize(index)?)?;
        Ok(())
    }

    pub fn get_collection_index(
        &self,
        collection_id: &str,
    ) -> Result<Option<CollectionIndex>, StoreError> {
        let key = keys::collection_index_key(collection_id)?;
        match self.collection_indices.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }
}
