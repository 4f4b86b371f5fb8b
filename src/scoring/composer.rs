//! Derives the bounded aesthetic score, its confidence and the provisional flag
//! from an item's rating state.

use crate::scoring::config::{ComposerConfig, EloConfig, ScoringConfig, SliderConfig};
use crate::scoring::types::{ComposedScore, ItemRatingState, ScoreBreakdown};

pub fn rating_component(rating_mean: f64, config: &ComposerConfig) -> f64 {
    let span = config.rating_domain_max - config.rating_domain_min;
    ((rating_mean - config.rating_domain_min) / span * 100.0).clamp(0.0, 100.0)
}

pub fn slider_component(state: &ItemRatingState, slider: &SliderConfig) -> f64 {
    if state.slider_weight > 0.0 {
        (state.slider_weighted_sum / state.slider_weight).clamp(0.0, 100.0)
    } else {
        slider.neutral_value
    }
}

/// Diminishing returns: the first few favorites count far more than the hundredth.
pub fn favorite_component(weighted_count: f64, config: &ComposerConfig) -> f64 {
    let weighted_count = weighted_count.max(0.0);
    ((1.0 + weighted_count).ln() / config.favorite_log_base.ln() * 100.0).min(100.0)
}

fn sufficiency(count: u64, target: u64) -> f64 {
    (count as f64 / target as f64).min(1.0) * 100.0
}

pub fn confidence(state: &ItemRatingState, composer: &ComposerConfig, elo: &EloConfig) -> f64 {
    let span = elo.uncertainty_ceiling - elo.uncertainty_floor;
    let normalized_uncertainty =
        ((state.rating_uncertainty - elo.uncertainty_floor) / span).clamp(0.0, 1.0);
    let certainty = (1.0 - normalized_uncertainty) * 100.0;

    let comparisons = sufficiency(state.total_comparisons, composer.comparison_sufficiency_target);
    let sliders = sufficiency(state.total_slider_ratings, composer.slider_sufficiency_target);

    (composer.confidence_uncertainty_weight * certainty
        + composer.confidence_comparison_weight * comparisons
        + composer.confidence_slider_weight * sliders)
        .clamp(0.0, 100.0)
}

pub fn compose(state: &ItemRatingState, config: &ScoringConfig) -> ComposedScore {
    let composer = &config.composer;
    let reliability = state.avg_voter_reliability;

    let breakdown = ScoreBreakdown {
        rating_component: (rating_component(state.rating_mean, composer) * reliability)
            .clamp(0.0, 100.0),
        slider_component: (slider_component(state, &config.slider) * reliability)
            .clamp(0.0, 100.0),
        favorite_component: (favorite_component(state.favorite_weighted_sum, composer)
            * reliability)
            .clamp(0.0, 100.0),
    };

    let score = if state.has_events() {
        (composer.rating_weight * breakdown.rating_component
            + composer.slider_weight * breakdown.slider_component
            + composer.favorite_weight * breakdown.favorite_component)
            .clamp(0.0, 100.0)
    } else {
        config.slider.neutral_value
    };

    let confidence = confidence(state, composer, &config.elo);

    let provisional = state.total_comparisons < composer.provisional_min_comparisons
        || state.total_slider_ratings < composer.provisional_min_sliders
        || confidence < composer.provisional_min_confidence;

    ComposedScore {
        score,
        confidence,
        provisional,
        breakdown,
    }
}
