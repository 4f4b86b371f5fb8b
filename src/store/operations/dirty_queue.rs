//! Deduplicated work queue of items whose state is behind their events.
//!
//! One entry per item. Claims are taken with compare-and-swap on the entry
//! bytes, so two workers can never hold the same item. A claim older than the
//! configured timeout is considered abandoned and may be taken again; the
//! random token then fences the stale holder out of `commit_item_outcome`.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::MAX_CAS_RETRIES;
use crate::scoring::types::Priority;
use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirtyEntry {
    pub item_id: String,
    pub priority: Priority,
    pub enqueued_at: DateTime<Utc>,
    pub claim_token: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    /// New events arrived while the item was claimed.
    pub redirty: bool,
    pub last_error: Option<String>,
    /// Not claimable before this time. Cleared when new events arrive.
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
}

impl DirtyEntry {
    fn new(item_id: &str, priority: Priority, now: DateTime<Utc>) -> Self {
        Self {
            item_id: item_id.to_string(),
            priority,
            enqueued_at: now,
            claim_token: None,
            claimed_at: None,
            attempts: 0,
            redirty: false,
            last_error: None,
            not_before: None,
        }
    }

    pub fn is_deferred(&self, now: DateTime<Utc>) -> bool {
        self.not_before.is_some_and(|at| at > now)
    }

    pub fn is_claimed(&self, now: DateTime<Utc>, claim_timeout: Duration) -> bool {
        match (&self.claim_token, self.claimed_at) {
            (Some(_), Some(at)) => now - at < claim_timeout,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub item_id: String,
    pub token: String,
    pub priority: Priority,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub depth: usize,
    pub in_flight: usize,
    pub deferred: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
}

impl Store {
    /// Upsert the item's dirty marker. Priority only ever rises and the
    /// original enqueue time is kept, so repeated marks do not starve an item.
    pub fn mark_dirty(&self, item_id: &str, priority: Priority) -> Result<DirtyEntry, StoreError> {
        let key = keys::item_key(item_id)?;

        for _ in 0..MAX_CAS_RETRIES {
            let current = self.dirty_queue.get(key.as_bytes())?;
            let now = Utc::now();
            let next = match &current {
                Some(raw) => {
                    let mut entry: DirtyEntry = Self::deserialize(raw)?;
                    entry.priority = entry.priority.max(priority);
                    entry.not_before = None;
                    if entry.claim_token.is_some() {
                        entry.redirty = true;
                    }
                    entry
                }
                None => DirtyEntry::new(item_id, priority, now),
            };
            let next_bytes = Self::serialize(&next)?;

            let swapped = self.dirty_queue.compare_and_swap(
                key.as_bytes(),
                current.clone(),
                Some(next_bytes),
            )?;
            if swapped.is_ok() {
                return Ok(next);
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "dirty_queue".to_string(),
            key,
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// Queue the item for another look once `not_before` has passed. An entry
    /// that is already queued is left alone, since it has pending events.
    pub fn defer_dirty(
        &self,
        item_id: &str,
        priority: Priority,
        not_before: DateTime<Utc>,
    ) -> Result<DirtyEntry, StoreError> {
        let key = keys::item_key(item_id)?;
        let mut entry = DirtyEntry::new(item_id, priority, Utc::now());
        entry.not_before = Some(not_before);
        let bytes = Self::serialize(&entry)?;

        match self
            .dirty_queue
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(bytes))?
        {
            Ok(()) => Ok(entry),
            Err(conflict) => match conflict.current {
                Some(raw) => Self::deserialize(&raw),
                None => Ok(entry),
            },
        }
    }

    pub fn get_dirty_entry(&self, item_id: &str) -> Result<Option<DirtyEntry>, StoreError> {
        let key = keys::item_key(item_id)?;
        match self.dirty_queue.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Claim up to `limit` unclaimed (or abandoned) entries at or above
    /// `min_priority`, highest priority first, then oldest first.
    pub fn claim_dirty(
        &self,
        limit: usize,
        min_priority: Priority,
        claim_timeout: Duration,
    ) -> Result<Vec<Claim>, StoreError> {
        self.claim_dirty_excluding(limit, min_priority, claim_timeout, &HashSet::new())
    }

    /// Like [`Store::claim_dirty`], but never hands out the items in `exclude`.
    /// A run uses it to avoid re-claiming items it already handled.
    pub fn claim_dirty_excluding(
        &self,
        limit: usize,
        min_priority: Priority,
        claim_timeout: Duration,
        exclude: &HashSet<String>,
    ) -> Result<Vec<Claim>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now = Utc::now();

        let mut candidates = Vec::new();
        for entry in self.dirty_queue.iter() {
            let (key, raw) = entry?;
            let parsed: DirtyEntry = match Self::deserialize(&raw) {
                Ok(parsed) => parsed,
                Err(error) => {
                    tracing::warn!(
                        key = %String::from_utf8_lossy(&key),
                        error = %error,
                        "Skipping unreadable dirty queue entry"
                    );
                    continue;
                }
            };
            if parsed.priority < min_priority
                || parsed.is_claimed(now, claim_timeout)
                || parsed.is_deferred(now)
                || exclude.contains(&parsed.item_id)
            {
                continue;
            }
            candidates.push((parsed, raw));
        }

        candidates.sort_by(|(a, _), (b, _)| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.enqueued_at.cmp(&b.enqueued_at))
        });

        let mut claims = Vec::with_capacity(limit.min(candidates.len()));
        for (mut entry, raw) in candidates {
            if claims.len() >= limit {
                break;
            }
            let token = Uuid::new_v4().to_string();
            if entry.claim_token.is_some() {
                tracing::warn!(item_id = %entry.item_id, "Reclaiming abandoned claim");
            }
            entry.claim_token = Some(token.clone());
            entry.claimed_at = Some(now);
            entry.redirty = false;
            let next_bytes = Self::serialize(&entry)?;

            let swapped = self.dirty_queue.compare_and_swap(
                entry.item_id.as_bytes(),
                Some(raw),
                Some(next_bytes),
            )?;
            // Lost the race to another worker or a concurrent mark: leave it.
            if swapped.is_ok() {
                claims.push(Claim {
                    item_id: entry.item_id,
                    token,
                    priority: entry.priority,
                    attempts: entry.attempts,
                });
            }
        }

        Ok(claims)
    }

    /// Give a failed claim back to the queue. A token that no longer matches
    /// means somebody else owns the item now; that is not an error.
    pub fn release_claim(&self, item_id: &str, token: &str, error: &str) -> Result<(), StoreError> {
        let key = keys::item_key(item_id)?;

        for _ in 0..MAX_CAS_RETRIES {
            let Some(current) = self.dirty_queue.get(key.as_bytes())? else {
                return Ok(());
            };
            let mut entry: DirtyEntry = Self::deserialize(&current)?;
            if entry.claim_token.as_deref() != Some(token) {
                return Ok(());
            }
            entry.claim_token = None;
            entry.claimed_at = None;
            entry.redirty = false;
            entry.attempts = entry.attempts.saturating_add(1);
            entry.last_error = Some(error.to_string());
            let next_bytes = Self::serialize(&entry)?;

            let swapped =
                self.dirty_queue
                    .compare_and_swap(key.as_bytes(), Some(current), Some(next_bytes))?;
            if swapped.is_ok() {
                return Ok(());
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "dirty_queue".to_string(),
            key,
            attempts: MAX_CAS_RETRIES,
        })
    }

    pub fn dirty_queue_stats(&self, claim_timeout: Duration) -> Result<QueueStats, StoreError> {
        let now = Utc::now();
        let mut stats = QueueStats::default();
        for entry in self.dirty_queue.iter() {
            let (_, raw) = entry?;
            let entry: DirtyEntry = Self::deserialize(&raw)?;
            stats.depth += 1;
            if entry.is_claimed(now, claim_timeout) {
                stats.in_flight += 1;
            }
            if entry.is_deferred(now) {
                stats.deferred += 1;
            }
            match entry.priority {
                Priority::High => stats.high += 1,
                Priority::Normal => stats.normal += 1,
                Priority::Low => stats.low += 1,
            }
            stats.oldest_enqueued_at = Some(match stats.oldest_enqueued_at {
                Some(oldest) => oldest.min(entry.enqueued_at),
                None => entry.enqueued_at,
            });
        }
        Ok(stats)
    }
}
