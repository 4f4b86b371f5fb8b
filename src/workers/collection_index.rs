//! Recomputes the Collection Aesthetic Index from published item scores.

use chrono::Utc;

use crate::scoring::collection::{self, MemberScore};
use crate::scoring::config::CollectionConfig;
use crate::scoring::types::CollectionIndex;
use crate::store::{Store, StoreError};

/// Aggregate one collection and persist the result. Members that have never
/// published a score count toward `total_items` but not toward the mean.
pub fn recompute_collection(
    store: &Store,
    collection_id: &str,
    config: &CollectionConfig,
) -> Result<CollectionIndex, StoreError> {
    let item_ids = store.list_collection_items(collection_id)?;
    let members: Vec<MemberScore> = store
        .get_published_scores(&item_ids)?
        .into_iter()
        .filter(|score| score.is_published())
        .map(|score| MemberScore {
            score: score.score,
            vote_count: score.vote_count,
        })
        .collect();

    let index = collection::aggregate(collection_id, &members, item_ids.len(), Utc::now(), config);
    store.put_collection_index(&index)?;
    Ok(index)
}

pub async fn run(store: &Store, config: &CollectionConfig) {
    tracing::debug!("collection_index: start");
    let collections = match store.list_collections() {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!(error = %e, "collection_index: failed to list collections");
            return;
        }
    };

    let mut updated = 0usize;
    for collection_id in &collections {
        match recompute_collection(store, collection_id, config) {
            Ok(index) => {
                updated += 1;
                tracing::debug!(
                    collection_id = %collection_id,
                    index_score = index.index_score,
                    confidence = index.confidence,
                    scored_items = index.scored_items,
                    "Collection index updated"
                );
            }
            Err(e) => {
                tracing::warn!(collection_id = %collection_id, error = %e, "Collection index failed")
            }
        }
        tokio::task::yield_now().await;
    }

    tracing::info!(
        collections = collections.len(),
        updated,
        "collection_index: done"
    );
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn unscored_members_only_count_toward_coverage() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        for item in ["a", "b", "c", "d"] {
            store.register_item(item, "c1").unwrap();
        }

        let index = recompute_collection(&store, "c1", &CollectionConfig::default()).unwrap();
        assert_eq!(index.total_items, 4);
        assert_eq!(index.scored_items, 0);
        assert_eq!(index.index_score, 0.0);
        assert!(index.provisional);

        let stored = store.get_collection_index("c1").unwrap().unwrap();
        assert_eq!(stored.total_items, 4);
    }
}
