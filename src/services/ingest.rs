//! Voting-path ingestion: validate, append, mark dirty.
//!
//! Nothing here touches rating state. Events that pass these checks can still
//! be skipped at fold time (an opponent removed later, a voter id the fold
//! rejects), so the batch worker never trusts ingestion alone.

use serde::Serialize;

use crate::constants::MAX_SLIDER_SCORE;
use crate::scoring::types::{ComparisonEvent, ComparisonOutcome, FavoriteEvent, Priority, SliderEvent};
use crate::store::keys;
use crate::store::{Store, StoreError};

/// An appended event and the priority its items were marked dirty with.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingested<E> {
    pub event: E,
    pub priority: Priority,
}

impl<E> Ingested<E> {
    pub fn wants_priority_run(&self) -> bool {
        self.priority == Priority::High
    }
}

fn require_item(store: &Store, item_id: &str) -> Result<(), StoreError> {
    if !store.item_exists(item_id)? {
        return Err(StoreError::NotFound {
            entity: "item".to_string(),
            key: item_id.to_string(),
        });
    }
    Ok(())
}

pub fn ingest_comparison(
    store: &Store,
    item_a: &str,
    item_b: &str,
    outcome: ComparisonOutcome,
    voter_id: &str,
    super_vote: bool,
) -> Result<Ingested<ComparisonEvent>, StoreError> {
    keys::validate_id("voter", voter_id)?;
    if item_a == item_b {
        return Err(StoreError::Validation(
            "an item cannot be compared with itself".to_string(),
        ));
    }
    require_item(store, item_a)?;
    require_item(store, item_b)?;

    let event = store.append_comparison(item_a, item_b, outcome, voter_id, super_vote)?;
    let priority = if super_vote {
        Priority::High
    } else {
        Priority::Normal
    };
    store.mark_dirty(item_a, priority)?;
    store.mark_dirty(item_b, priority)?;

    tracing::debug!(
        event_id = event.id,
        item_a,
        item_b,
        voter_id,
        super_vote,
        "Comparison recorded"
    );
    Ok(Ingested { event, priority })
}

pub fn ingest_slider(
    store: &Store,
    voter_id: &str,
    item_id: &str,
    raw_score: f64,
) -> Result<Ingested<SliderEvent>, StoreError> {
    keys::validate_id("voter", voter_id)?;
    if !raw_score.is_finite() || !(0.0..=MAX_SLIDER_SCORE).contains(&raw_score) {
        return Err(StoreError::Validation(format!(
            "slider score must be within 0..={MAX_SLIDER_SCORE}"
        )));
    }
    require_item(store, item_id)?;

    let event = store.append_slider(voter_id, item_id, raw_score)?;
    store.mark_dirty(item_id, Priority::Normal)?;
    tracing::debug!(event_id = event.id, item_id, voter_id, raw_score, "Slider recorded");
    Ok(Ingested {
        event,
        priority: Priority::Normal,
    })
}

pub fn ingest_favorite(
    store: &Store,
    voter_id: &str,
    item_id: &str,
) -> Result<Ingested<FavoriteEvent>, StoreError> {
    keys::validate_id("voter", voter_id)?;
    require_item(store, item_id)?;

    let event = store.append_favorite(voter_id, item_id)?;
    store.mark_dirty(item_id, Priority::Normal)?;
    tracing::debug!(event_id = event.id, item_id, voter_id, "Favorite recorded");
    Ok(Ingested {
        event,
        priority: Priority::Normal,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        store.register_item("a", "c1").unwrap();
        store.register_item("b", "c1").unwrap();
        (dir, store)
    }

    #[test]
    fn super_votes_mark_both_items_high() {
        let (_dir, store) = store();
        let ingested =
            ingest_comparison(&store, "a", "b", ComparisonOutcome::ItemA, "v1", true).unwrap();
        assert!(ingested.wants_priority_run());
        for item in ["a", "b"] {
            let entry = store.get_dirty_entry(item).unwrap().unwrap();
            assert_eq!(entry.priority, Priority::High);
        }
    }

    #[test]
    fn rejects_bad_input_without_appending() {
        let (_dir, store) = store();
        assert!(matches!(
            ingest_comparison(&store, "a", "a", ComparisonOutcome::ItemA, "v1", false),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            ingest_comparison(&store, "a", "ghost", ComparisonOutcome::ItemA, "v1", false),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            ingest_slider(&store, "v1", "a", 100.5),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            ingest_slider(&store, "v1", "a", f64::NAN),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            ingest_favorite(&store, "", "a"),
            Err(StoreError::Validation(_))
        ));
        assert!(store.get_dirty_entry("a").unwrap().is_none());
        assert_eq!(store.count_events(crate::scoring::types::EventStream::Comparisons), 0);
    }

    #[test]
    fn slider_and_favorite_mark_normal() {
        let (_dir, store) = store();
        ingest_slider(&store, "v1", "a", 0.0).unwrap();
        ingest_favorite(&store, "v1", "b").unwrap();
        assert_eq!(
            store.get_dirty_entry("a").unwrap().unwrap().priority,
            Priority::Normal
        );
        assert_eq!(
            store.get_dirty_entry("b").unwrap().unwrap().priority,
            Priority::Normal
        );
    }
}
