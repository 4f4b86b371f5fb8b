//! Decides when an internally updated score becomes the externally visible one.
//!
//! ```text
//! Unscored --(all minimums met)--> ProvisionalPublished | Published
//! Published --(inside grace, candidate moved)--> StalePendingRepublish
//! Published/Stale --(after grace, material change)--> republished
//! ```
//! There is no edge back to `Unscored`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::scoring::config::PublishGateConfig;
use crate::scoring::types::{ComposedScore, ItemRatingState, PublishState, PublishedScore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishReason {
    FirstPublish,
    ScoreDelta,
    ConfidenceTier,
    ReachedFullConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    InsufficientData,
    GracePeriod,
    NoMaterialChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum GateDecision {
    Publish(PublishReason),
    Suppress(SuppressReason),
}

#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub decision: GateDecision,
    /// Record to persist, if anything visible (score or gate state) changed.
    pub record: Option<PublishedScore>,
}

impl GateOutcome {
    pub fn published(&self) -> bool {
        matches!(self.decision, GateDecision::Publish(_))
    }
}

pub fn minimums_met(state: &ItemRatingState, config: &PublishGateConfig) -> bool {
    state.total_comparisons >= config.min_comparisons
        && state.distinct_opponents.len() >= config.min_distinct_opponents
        && state.total_slider_ratings >= config.min_slider_ratings
        && state.distinct_slider_raters.len() >= config.min_distinct_slider_raters
}

fn confidence_tier(confidence: f64, config: &PublishGateConfig) -> i64 {
    (confidence / config.confidence_tier_width).floor() as i64
}

fn settled_state(provisional: bool) -> PublishState {
    if provisional {
        PublishState::ProvisionalPublished
    } else {
        PublishState::Published
    }
}

fn publish(
    previous: &PublishedScore,
    state: &ItemRatingState,
    candidate: &ComposedScore,
    now: DateTime<Utc>,
    reason: PublishReason,
) -> GateOutcome {
    let record = PublishedScore {
        item_id: previous.item_id.clone(),
        score: candidate.score,
        confidence: candidate.confidence,
        provisional: candidate.provisional,
        breakdown: candidate.breakdown,
        vote_count: state.vote_count(),
        state: settled_state(candidate.provisional),
        published_at: Some(now),
        published_at_full_confidence: previous.published_at_full_confidence
            || !candidate.provisional,
        updated_at: now,
    };
    GateOutcome {
        decision: GateDecision::Publish(reason),
        record: Some(record),
    }
}

fn suppress_with_state(
    previous: &PublishedScore,
    next_state: PublishState,
    now: DateTime<Utc>,
    reason: SuppressReason,
) -> GateOutcome {
    let record = (previous.state != next_state).then(|| PublishedScore {
        state: next_state,
        updated_at: now,
        ..previous.clone()
    });
    GateOutcome {
        decision: GateDecision::Suppress(reason),
        record,
    }
}

/// End of the grace period that follows the last publication, or `None` if
/// the item has never been published.
pub fn grace_ends_at(
    previous: &PublishedScore,
    config: &PublishGateConfig,
) -> Option<DateTime<Utc>> {
    let published_at = previous.published_at?;
    Some(
        Duration::try_minutes(config.grace_period_minutes)
            .and_then(|grace| published_at.checked_add_signed(grace))
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    )
}

pub fn evaluate(
    previous: &PublishedScore,
    state: &ItemRatingState,
    candidate: &ComposedScore,
    now: DateTime<Utc>,
    config: &PublishGateConfig,
) -> GateOutcome {
    if previous.state == PublishState::Unscored {
        if minimums_met(state, config) {
            return publish(previous, state, candidate, now, PublishReason::FirstPublish);
        }
        return GateOutcome {
            decision: GateDecision::Suppress(SuppressReason::InsufficientData),
            record: None,
        };
    }

    let delta = (candidate.score - previous.score).abs();
    let tier_changed = confidence_tier(candidate.confidence, config)
        != confidence_tier(previous.confidence, config);
    let reaches_full = !previous.published_at_full_confidence && !candidate.provisional;

    let within_grace = grace_ends_at(previous, config)
        .map(|end| now < end)
        .unwrap_or(false);

    if within_grace {
        let moved = delta > f64::EPSILON
            || tier_changed
            || candidate.provisional != previous.provisional;
        let next_state = if moved {
            PublishState::StalePendingRepublish
        } else {
            previous.state
        };
        return suppress_with_state(previous, next_state, now, SuppressReason::GracePeriod);
    }

    if delta > config.score_delta_threshold {
        return publish(previous, state, candidate, now, PublishReason::ScoreDelta);
    }
    if tier_changed {
        return publish(previous, state, candidate, now, PublishReason::ConfidenceTier);
    }
    if reaches_full {
        return publish(
            previous,
            state,
            candidate,
            now,
            PublishReason::ReachedFullConfidence,
        );
    }

    suppress_with_state(
        previous,
        settled_state(previous.provisional),
        now,
        SuppressReason::NoMaterialChange,
    )
}
