//! Append-only event streams.
//!
//! Each stream lives in its own tree keyed by big-endian id. A shared
//! `item_event_index` tree maps `{item}:{stream}:{id}` to nothing so a single
//! item's backlog can be range-scanned without touching other items' events.

use chrono::Utc;
use serde::de::DeserializeOwned;
use sled::transaction::ConflictableTransactionResult;
use sled::Transactional;

use crate::scoring::types::{
    ComparisonEvent, ComparisonOutcome, EventStream, FavoriteEvent, SliderEvent,
};
use crate::store::keys;
use crate::store::{Store, StoreError};

impl Store {
    fn stream_tree(&self, stream: EventStream) -> &sled::Tree {
        match stream {
            EventStream::Comparisons => &self.comparison_events,
            EventStream::Sliders => &self.slider_events,
            EventStream::Favorites => &self.favorite_events,
        }
    }

    /// Assign an id and write the event plus its per-item index entries in
    /// one transaction.
    fn append_event<F>(
        &self,
        stream: EventStream,
        item_ids: &[&str],
        build: F,
    ) -> Result<u64, StoreError>
    where
        F: FnOnce(u64) -> Result<Vec<u8>, StoreError>,
    {
        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // sled ids are monotonic across restarts; shifted so 0 stays "nothing seen".
        let id = self.raw_db().generate_id()? + 1;
        let value = build(id)?;
        let index_keys = item_ids
            .iter()
            .map(|item_id| keys::item_event_key(item_id, stream, id))
            .collect::<Result<Vec<_>, _>>()?;
        let event_key = keys::event_key(id);

        (self.stream_tree(stream), &self.item_event_index).transaction(
            |(tx_events, tx_index)| -> ConflictableTransactionResult<(), StoreError> {
                tx_events.insert(&event_key[..], value.as_slice())?;
                for index_key in &index_keys {
                    tx_index.insert(index_key.as_bytes(), &[])?;
                }
                Ok(())
            },
        )?;

        Ok(id)
    }

    pub fn append_comparison(
        &self,
        item_a: &str,
        item_b: &str,
        outcome: ComparisonOutcome,
        voter_id: &str,
        super_vote: bool,
    ) -> Result<ComparisonEvent, StoreError> {
        keys::validate_id("voter", voter_id)?;
        let mut stored = None;
        let mut item_ids = vec![item_a];
        if item_b != item_a {
            item_ids.push(item_b);
        }
        self.append_event(EventStream::Comparisons, &item_ids, |id| {
            let event = ComparisonEvent {
                id,
                item_a: item_a.to_string(),
                item_b: item_b.to_string(),
                outcome,
                voter_id: voter_id.to_string(),
                super_vote,
                created_at: Utc::now(),
            };
            let bytes = Self::serialize(&event)?;
            stored = Some(event);
            Ok(bytes)
        })?;
        stored.ok_or_else(|| StoreError::Validation("comparison was not built".to_string()))
    }

    pub fn append_slider(
        &self,
        voter_id: &str,
        item_id: &str,
        raw_score: f64,
    ) -> Result<SliderEvent, StoreError> {
        keys::validate_id("voter", voter_id)?;
        let mut stored = None;
        self.append_event(EventStream::Sliders, &[item_id], |id| {
            let event = SliderEvent {
                id,
                item_id: item_id.to_string(),
                voter_id: voter_id.to_string(),
                raw_score,
                created_at: Utc::now(),
            };
            let bytes = Self::serialize(&event)?;
            stored = Some(event);
            Ok(bytes)
        })?;
        stored.ok_or_else(|| StoreError::Validation("slider was not built".to_string()))
    }

    pub fn append_favorite(
        &self,
        voter_id: &str,
        item_id: &str,
    ) -> Result<FavoriteEvent, StoreError> {
        keys::validate_id("voter", voter_id)?;
        let mut stored = None;
        self.append_event(EventStream::Favorites, &[item_id], |id| {
            let event = FavoriteEvent {
                id,
                item_id: item_id.to_string(),
                voter_id: voter_id.to_string(),
                created_at: Utc::now(),
            };
            let bytes = Self::serialize(&event)?;
            stored = Some(event);
            Ok(bytes)
        })?;
        stored.ok_or_else(|| StoreError::Validation("favorite was not built".to_string()))
    }

    /// Events of `stream` touching `item_id` with id > `after_id`, ascending,
    /// at most `limit`.
    pub fn read_events_since<T: DeserializeOwned>(
        &self,
        item_id: &str,
        stream: EventStream,
        after_id: u64,
        limit: usize,
    ) -> Result<Vec<T>, StoreError> {
        let prefix = keys::item_event_prefix(item_id, stream)?;
        let start = keys::item_event_key(item_id, stream, after_id.saturating_add(1))?;
        let tree = self.stream_tree(stream);

        let mut events = Vec::new();
        for entry in self.item_event_index.range(start.as_bytes()..) {
            if events.len() >= limit {
                break;
            }
            let (key, _) = entry?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let Some(event_id) = keys::parse_item_event_id(&key) else {
                tracing::warn!(item_id, stream = stream.as_str(), "Malformed event index key");
                continue;
            };
            match tree.get(keys::event_key(event_id))? {
                Some(raw) => events.push(Self::deserialize(&raw)?),
                None => {
                    tracing::warn!(item_id, event_id, "Indexed event missing from stream");
                }
            }
        }
        Ok(events)
    }

    pub fn comparisons_since(
        &self,
        item_id: &str,
        after_id: u64,
        limit: usize,
    ) -> Result<Vec<ComparisonEvent>, StoreError> {
        self.read_events_since(item_id, EventStream::Comparisons, after_id, limit)
    }

    pub fn sliders_since(
        &self,
        item_id: &str,
        after_id: u64,
        limit: usize,
    ) -> Result<Vec<SliderEvent>, StoreError> {
        self.read_events_since(item_id, EventStream::Sliders, after_id, limit)
    }

    pub fn favorites_since(
        &self,
        item_id: &str,
        after_id: u64,
        limit: usize,
    ) -> Result<Vec<FavoriteEvent>, StoreError> {
        self.read_events_since(item_id, EventStream::Favorites, after_id, limit)
    }

    pub fn count_events(&self, stream: EventStream) -> usize {
        self.stream_tree(stream).len()
    }
}
