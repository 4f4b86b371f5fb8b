//! Incremental update engine.
//!
//! Folds an item's not-yet-seen events into its rating state, composes a
//! candidate score, runs the publish gate and commits the result. Each event
//! stream is gated by its own watermark, so redelivered events are no-ops.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::scoring::config::{ReliabilityConfig, ScoringConfig};
use crate::scoring::publish_gate::{self, GateDecision, SuppressReason};
use crate::scoring::types::{
    ComparisonEvent, ComposedScore, EventStream, FavoriteEvent, ItemRatingState, Priority,
    PublishState, PublishedScore, SliderEvent, VoterCalibration,
};
use crate::scoring::{calibration, composer, elo, reliability, ScoringError};
use crate::store::keys;
use crate::store::operations::commit::{CommitStatus, ItemCommit, VoterWrite};
use crate::store::operations::dirty_queue::Claim;
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoldReport {
    pub applied: usize,
    pub duplicates: usize,
    pub integrity_skipped: usize,
}

impl FoldReport {
    pub fn absorb(&mut self, other: FoldReport) {
        self.applied += other.applied;
        self.duplicates += other.duplicates;
        self.integrity_skipped += other.integrity_skipped;
    }

    /// Events that moved a watermark.
    pub fn consumed(&self) -> usize {
        self.applied + self.integrity_skipped
    }
}

#[derive(Debug, Clone)]
struct LoadedVoter {
    voter: VoterCalibration,
    loaded_version: Option<u64>,
}

/// Voters seen while processing one item. Only voters whose state was
/// mutated are written back.
#[derive(Debug, Default)]
pub struct VoterCache {
    entries: HashMap<String, LoadedVoter>,
    touched: BTreeSet<String>,
}

impl VoterCache {
    pub fn contains(&self, voter_id: &str) -> bool {
        self.entries.contains_key(voter_id)
    }

    pub fn insert_loaded(&mut self, voter: VoterCalibration) {
        let loaded_version = Some(voter.version);
        self.entries.insert(
            voter.voter_id.clone(),
            LoadedVoter {
                voter,
                loaded_version,
            },
        );
    }

    fn get_mut(&mut self, voter_id: &str, config: &ReliabilityConfig) -> &mut VoterCalibration {
        self.touched.insert(voter_id.to_string());
        &mut self
            .entries
            .entry(voter_id.to_string())
            .or_insert_with(|| LoadedVoter {
                voter: VoterCalibration::new(voter_id, config),
                loaded_version: None,
            })
            .voter
    }

    pub fn reliability(&self, voter_id: &str, config: &ReliabilityConfig) -> f64 {
        self.entries
            .get(voter_id)
            .map(|loaded| loaded.voter.reliability_score)
            .unwrap_or(config.initial)
    }

    pub fn get(&self, voter_id: &str) -> Option<&VoterCalibration> {
        self.entries.get(voter_id).map(|loaded| &loaded.voter)
    }

    pub fn touched_count(&self) -> usize {
        self.touched.len()
    }

    pub fn into_writes(mut self) -> Vec<VoterWrite> {
        let now = Utc::now();
        self.touched
            .iter()
            .filter_map(|voter_id| self.entries.remove(voter_id))
            .map(|mut loaded| {
                loaded.voter.updated_at = now;
                VoterWrite {
                    voter: loaded.voter,
                    loaded_version: loaded.loaded_version,
                }
            })
            .collect()
    }
}

fn voter_problem(voter_id: &str) -> Option<&'static str> {
    if voter_id.is_empty() {
        Some("missing_voter")
    } else if keys::validate_id("voter", voter_id).is_err() {
        Some("invalid_voter")
    } else {
        None
    }
}

fn log_skip(item_id: &str, stream: EventStream, event_id: u64, reason: &str) {
    tracing::warn!(
        item_id,
        stream = stream.as_str(),
        event_id,
        reason,
        "Skipping event that fails integrity checks"
    );
}

/// Fold comparisons into `state`. `opponent_ratings` holds the current rating
/// of every known opponent; an opponent missing from it is treated as an
/// unknown item.
///
/// Voter reliability is judged only on the `item_a` side so that a vote is
/// counted once even though both items fold it.
pub fn fold_comparisons(
    state: &mut ItemRatingState,
    voters: &mut VoterCache,
    events: &[ComparisonEvent],
    opponent_ratings: &HashMap<String, f64>,
    config: &ScoringConfig,
) -> FoldReport {
    let mut report = FoldReport::default();
    for event in events {
        if event.id <= state.watermark(EventStream::Comparisons) {
            report.duplicates += 1;
            continue;
        }

        let checked = if event.item_a == event.item_b {
            Err("self_comparison")
        } else if let Some(reason) = voter_problem(&event.voter_id) {
            Err(reason)
        } else {
            match event.opponent_of(&state.item_id) {
                None => Err("item_not_in_comparison"),
                Some(opponent_id) => match opponent_ratings.get(opponent_id) {
                    None => Err("unknown_opponent"),
                    Some(&rating) => Ok((opponent_id, rating)),
                },
            }
        };

        match checked {
            Err(reason) => {
                log_skip(&state.item_id, EventStream::Comparisons, event.id, reason);
                report.integrity_skipped += 1;
            }
            Ok((opponent_id, opponent_rating)) => {
                let own_before = state.rating_mean;
                match event.resolved() {
                    Some((winner, _)) => {
                        let won = winner == state.item_id;
                        elo::apply_resolved(
                            state,
                            opponent_rating,
                            won,
                            event.super_vote,
                            &config.elo,
                        );
                        if event.item_a == state.item_id {
                            let (winner_rating, loser_rating) = if won {
                                (own_before, opponent_rating)
                            } else {
                                (opponent_rating, own_before)
                            };
                            let voter = voters.get_mut(&event.voter_id, &config.reliability);
                            reliability::record_judgement(
                                voter,
                                winner_rating,
                                loser_rating,
                                &config.reliability,
                            );
                        }
                    }
                    None => elo::apply_no_preference(state, event.super_vote, &config.elo),
                }
                state.note_opponent(opponent_id);
                let voter_reliability = voters.reliability(&event.voter_id, &config.reliability);
                reliability::blend_into_item(state, voter_reliability, &config.reliability);
                report.applied += 1;
            }
        }
        state.advance_watermark(EventStream::Comparisons, event.id);
    }
    report
}

pub fn fold_sliders(
    state: &mut ItemRatingState,
    voters: &mut VoterCache,
    events: &[SliderEvent],
    config: &ScoringConfig,
) -> FoldReport {
    let mut report = FoldReport::default();
    for event in events {
        if event.id <= state.watermark(EventStream::Sliders) {
            report.duplicates += 1;
            continue;
        }

        let problem = if event.item_id != state.item_id {
            Some("item_mismatch")
        } else if !event.raw_score.is_finite() || !(0.0..=100.0).contains(&event.raw_score) {
            Some("slider_out_of_range")
        } else {
            voter_problem(&event.voter_id)
        };

        if let Some(reason) = problem {
            log_skip(&state.item_id, EventStream::Sliders, event.id, reason);
            report.integrity_skipped += 1;
        } else {
            let voter = voters.get_mut(&event.voter_id, &config.reliability);
            let normalized = calibration::observe(voter, event.raw_score, &config.slider);
            let weight = voter.reliability_score;

            state.slider_weighted_sum += normalized * weight;
            state.slider_weight += weight;
            state.total_slider_ratings += 1;
            state.note_slider_rater(&event.voter_id);
            reliability::blend_into_item(state, weight, &config.reliability);
            report.applied += 1;
        }
        state.advance_watermark(EventStream::Sliders, event.id);
    }
    report
}

pub fn fold_favorites(
    state: &mut ItemRatingState,
    voters: &VoterCache,
    events: &[FavoriteEvent],
    config: &ScoringConfig,
) -> FoldReport {
    let mut report = FoldReport::default();
    for event in events {
        if event.id <= state.watermark(EventStream::Favorites) {
            report.duplicates += 1;
            continue;
        }

        let problem = if event.item_id != state.item_id {
            Some("item_mismatch")
        } else {
            voter_problem(&event.voter_id)
        };

        if let Some(reason) = problem {
            log_skip(&state.item_id, EventStream::Favorites, event.id, reason);
            report.integrity_skipped += 1;
        } else {
            let weight = voters.reliability(&event.voter_id, &config.reliability);
            state.favorite_weighted_sum += weight;
            state.total_favorites += 1;
            reliability::blend_into_item(state, weight, &config.reliability);
            report.applied += 1;
        }
        state.advance_watermark(EventStream::Favorites, event.id);
    }
    report
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome {
    pub item_id: String,
    pub fold: FoldReport,
    pub decision: Option<GateDecision>,
    pub published: bool,
    pub requeued: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPreview {
    pub state: ItemRatingState,
    pub candidate: ComposedScore,
    pub minimums_met: bool,
}

pub struct ScoringEngine {
    config: Arc<RwLock<ScoringConfig>>,
    store: Arc<Store>,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig, store: Arc<Store>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            store,
        }
    }

    pub async fn reload_config(&self, new_config: ScoringConfig) -> Result<(), ScoringError> {
        new_config.validate().map_err(ScoringError::Config)?;
        let mut cfg = self.config.write().await;
        *cfg = new_config;
        tracing::info!("Scoring config reloaded");
        Ok(())
    }

    pub async fn get_config(&self) -> ScoringConfig {
        self.config.read().await.clone()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn load_voters<'a>(
        &self,
        cache: &mut VoterCache,
        voter_ids: impl Iterator<Item = &'a str>,
    ) -> Result<(), ScoringError> {
        for voter_id in voter_ids {
            if cache.contains(voter_id) || voter_problem(voter_id).is_some() {
                continue;
            }
            if let Some(voter) = self.store.get_voter(voter_id)? {
                cache.insert_loaded(voter);
            }
        }
        Ok(())
    }

    /// Read-only snapshot of opponent ratings. Registered items without state
    /// yet sit at the initial rating.
    fn opponent_ratings(
        &self,
        item_id: &str,
        events: &[ComparisonEvent],
        known: &mut HashMap<String, f64>,
        config: &ScoringConfig,
    ) -> Result<(), ScoringError> {
        for event in events {
            let Some(opponent_id) = event.opponent_of(item_id) else {
                continue;
            };
            if known.contains_key(opponent_id)
                || opponent_id == item_id
                || keys::validate_id("item", opponent_id).is_err()
                || !self.store.item_exists(opponent_id)?
            {
                continue;
            }
            let rating = self
                .store
                .get_item_state(opponent_id)?
                .map(|s| s.rating_mean)
                .unwrap_or(config.elo.initial_rating);
            known.insert(opponent_id.to_string(), rating);
        }
        Ok(())
    }

    /// Load, fold, compose, gate and commit one claimed item. Blocking; the
    /// batch worker runs it on the blocking pool.
    pub fn process_item(
        &self,
        claim: &Claim,
        config: &ScoringConfig,
    ) -> Result<ItemOutcome, ScoringError> {
        let item_id = claim.item_id.as_str();
        let store = &self.store;

        if !store.item_exists(item_id)? {
            tracing::warn!(item_id, "Dirty item is not registered, dropping marker");
            let status = store.commit_item_outcome(&ItemCommit {
                item_id: item_id.to_string(),
                claim_token: claim.token.clone(),
                state: None,
                loaded_version: None,
                voters: Vec::new(),
                published: None,
            })?;
            return Ok(ItemOutcome {
                item_id: item_id.to_string(),
                fold: FoldReport::default(),
                decision: None,
                published: false,
                requeued: status == CommitStatus::Requeued,
            });
        }

        let stored = store.get_item_state(item_id)?;
        let loaded_version = stored.as_ref().map(|s| s.version);
        let mut state = stored
            .unwrap_or_else(|| ItemRatingState::new(item_id, &config.elo, &config.reliability));
        let mut voters = VoterCache::default();
        let mut fold = FoldReport::default();
        let page = config.batch.events_page_size.max(1);

        let mut opponents = HashMap::new();
        loop {
            let events = store.comparisons_since(item_id, state.last_comparison_event_id, page)?;
            if events.is_empty() {
                break;
            }
            self.load_voters(&mut voters, events.iter().map(|e| e.voter_id.as_str()))?;
            self.opponent_ratings(item_id, &events, &mut opponents, config)?;
            fold.absorb(fold_comparisons(
                &mut state,
                &mut voters,
                &events,
                &opponents,
                config,
            ));
            if events.len() < page {
                break;
            }
        }

        loop {
            let events = store.sliders_since(item_id, state.last_slider_event_id, page)?;
            if events.is_empty() {
                break;
            }
            self.load_voters(&mut voters, events.iter().map(|e| e.voter_id.as_str()))?;
            fold.absorb(fold_sliders(&mut state, &mut voters, &events, config));
            if events.len() < page {
                break;
            }
        }

        loop {
            let events = store.favorites_since(item_id, state.last_favorite_event_id, page)?;
            if events.is_empty() {
                break;
            }
            self.load_voters(&mut voters, events.iter().map(|e| e.voter_id.as_str()))?;
            fold.absorb(fold_favorites(&mut state, &voters, &events, config));
            if events.len() < page {
                break;
            }
        }

        let now = Utc::now();
        let changed = fold.consumed() > 0;
        if changed {
            state.updated_at = now;
        }

        let candidate = composer::compose(&state, config);
        let previous = store
            .get_published_score(item_id)?
            .unwrap_or_else(|| PublishedScore::unscored(item_id, config.slider.neutral_value));
        let gate = publish_gate::evaluate(&previous, &state, &candidate, now, &config.publish_gate);
        let stale = gate
            .record
            .as_ref()
            .map(|r| r.state == PublishState::StalePendingRepublish)
            .unwrap_or(previous.state == PublishState::StalePendingRepublish);

        let touched_voters = voters.touched_count();
        let status = store.commit_item_outcome(&ItemCommit {
            item_id: item_id.to_string(),
            claim_token: claim.token.clone(),
            state: changed.then_some(state),
            loaded_version,
            voters: voters.into_writes(),
            published: gate.record.clone(),
        })?;

        // A suppressed change still has to go out once the grace period ends.
        if gate.decision == GateDecision::Suppress(SuppressReason::GracePeriod) && stale {
            let due = publish_gate::grace_ends_at(&previous, &config.publish_gate).unwrap_or(now);
            store.defer_dirty(item_id, Priority::Low, due)?;
        }

        tracing::debug!(
            item_id,
            applied = fold.applied,
            duplicates = fold.duplicates,
            skipped = fold.integrity_skipped,
            touched_voters,
            score = candidate.score,
            confidence = candidate.confidence,
            published = gate.published(),
            "Item processed"
        );

        Ok(ItemOutcome {
            item_id: item_id.to_string(),
            fold,
            decision: Some(gate.decision),
            published: gate.published(),
            requeued: status == CommitStatus::Requeued,
        })
    }

    /// Stored state and the score it would compose to right now, without
    /// folding pending events.
    pub fn preview_item(
        &self,
        item_id: &str,
        config: &ScoringConfig,
    ) -> Result<Option<ItemPreview>, ScoringError> {
        if !self.store.item_exists(item_id)? {
            return Ok(None);
        }
        let state = self
            .store
            .get_item_state(item_id)?
            .unwrap_or_else(|| ItemRatingState::new(item_id, &config.elo, &config.reliability));
        let candidate = composer::compose(&state, config);
        let minimums_met = publish_gate::minimums_met(&state, &config.publish_gate);
        Ok(Some(ItemPreview {
            state,
            candidate,
            minimums_met,
        }))
    }
}
