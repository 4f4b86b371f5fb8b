use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::store::{abort, keys};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub item_id: String,
    pub collection_id: String,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Register an item under a collection. Re-registering with the same
    /// collection is a no-op; moving an item between collections is rejected.
    pub fn register_item(&self, item_id: &str, collection_id: &str) -> Result<Item, StoreError> {
        let key = keys::item_key(item_id)?;
        let membership_key = keys::collection_item_key(collection_id, item_id)?;
        let item = Item {
            item_id: item_id.to_string(),
            collection_id: collection_id.to_string(),
            created_at: Utc::now(),
        };
        let value = Self::serialize(&item)?;

        let stored = (&self.items, &self.collection_items).transaction(
            |(tx_items, tx_collection_items)| {
                if let Some(raw) = tx_items.get(key.as_bytes())? {
                    let existing: Item =
                        serde_json::from_slice(&raw).map_err(|e| abort(e.into()))?;
                    if existing.collection_id != collection_id {
                        return Err(abort(StoreError::Conflict {
                            entity: "item".to_string(),
                            key: key.clone(),
                        }));
                    }
                    return Ok(existing);
                }
                tx_items.insert(key.as_bytes(), value.as_slice())?;
                tx_collection_items.insert(membership_key.as_bytes(), &[])?;
                Ok(item.clone())
            },
        )?;

        Ok(stored)
    }

    pub fn get_item(&self, item_id: &str) -> Result<Option<Item>, StoreError> {
        let key = keys::item_key(item_id)?;
        match self.items.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn item_exists(&self, item_id: &str) -> Result<bool, StoreError> {
        let key = keys::item_key(item_id)?;
        Ok(self.items.contains_key(key.as_bytes())?)
    }

    pub fn list_collection_items(&self, collection_id: &str) -> Result<Vec<String>, StoreError> {
        let prefix = keys::collection_items_prefix(collection_id)?;
        let mut item_ids = Vec::new();
        for entry in self.collection_items.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry?;
            let key = String::from_utf8_lossy(&key);
            if let Some(item_id) = key.strip_prefix(prefix.as_str()) {
                item_ids.push(item_id.to_string());
            }
        }
        Ok(item_ids)
    }

    pub fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let mut collections = BTreeSet::new();
        for entry in self.collection_items.iter() {
            let (key, _) = entry?;
            let key = String::from_utf8_lossy(&key);
            if let Some((collection_id, _)) = key.split_once(':') {
                collections.insert(collection_id.to_string());
            }
        }
        Ok(collections.into_iter().collect())
    }
}
