//! Elo rating with an uncertainty companion for pairwise image comparisons.

use crate::scoring::config::EloConfig;
use crate::scoring::types::ItemRatingState;

/// Expected score for `own` against `opponent` (standard base-10 logistic).
pub fn expected_score(own: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((opponent - own) / 400.0))
}

pub fn k_factor(super_vote: bool, config: &EloConfig) -> f64 {
    if super_vote {
        config.k_factor * config.super_vote_k_multiplier
    } else {
        config.k_factor
    }
}

pub fn vote_weight(super_vote: bool, config: &EloConfig) -> u32 {
    if super_vote {
        config.super_vote_weight
    } else {
        config.normal_vote_weight
    }
}

pub fn rating_delta(own: f64, opponent: f64, won: bool, k: f64) -> f64 {
    let actual = if won { 1.0 } else { 0.0 };
    k * (actual - expected_score(own, opponent))
}

/// Widen by the staleness decay, then shrink; always clamped to `[floor, ceiling]`.
pub fn next_uncertainty(old: f64, config: &EloConfig) -> f64 {
    let widened = (old.powi(2) + config.uncertainty_decay.powi(2)).sqrt();
    (widened * config.uncertainty_shrink).clamp(config.uncertainty_floor, config.uncertainty_ceiling)
}

/// Fold one resolved comparison into `state`. Returns the applied rating delta.
pub fn apply_resolved(
    state: &mut ItemRatingState,
    opponent_rating: f64,
    won: bool,
    super_vote: bool,
    config: &EloConfig,
) -> f64 {
    let delta = rating_delta(
        state.rating_mean,
        opponent_rating,
        won,
        k_factor(super_vote, config),
    );
    state.rating_mean += delta;
    state.rating_uncertainty = next_uncertainty(state.rating_uncertainty, config);
    state.total_comparisons += u64::from(vote_weight(super_vote, config));
    delta
}

/// No winner exists, so only the comparison counter moves.
pub fn apply_no_preference(state: &mut ItemRatingState, super_vote: bool, config: &EloConfig) {
    state.total_comparisons += u64::from(vote_weight(super_vote, config));
}
