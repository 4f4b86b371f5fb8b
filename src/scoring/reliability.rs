//! Voter reliability feedback: agreement with the pre-vote rating order nudges a
//! voter toward the aligned target, disagreement toward the misaligned one.

use crate::scoring::config::ReliabilityConfig;
use crate::scoring::elo::expected_score;
use crate::scoring::types::{ItemRatingState, VoterCalibration};

/// How informative the match was: 1.0 for a coin flip, approaching 0 for a
/// foregone conclusion.
pub fn match_difficulty(winner_rating: f64, loser_rating: f64, config: &ReliabilityConfig) -> f64 {
    let expected = expected_score(winner_rating, loser_rating);
    (1.0 - (expected - 0.5).abs() * 2.0).clamp(config.min_difficulty, 1.0)
}

/// Apply one resolved comparison to the voter. Ratings must be the values from
/// before the comparison was folded. Returns whether the vote was aligned.
pub fn record_judgement(
    voter: &mut VoterCalibration,
    winner_rating: f64,
    loser_rating: f64,
    config: &ReliabilityConfig,
) -> bool {
    let aligned = winner_rating >= loser_rating;
    let target = if aligned {
        config.aligned_target
    } else {
        config.misaligned_target
    };
    let step = config.learning_rate * match_difficulty(winner_rating, loser_rating, config);
    voter.reliability_score += step * (target - voter.reliability_score);
    voter.reliability_score = voter.reliability_score.clamp(config.min, config.max);
    voter.comparisons_judged += 1;
    aligned
}

/// Blend a touching voter's reliability into the item-level EMA.
pub fn blend_into_item(item: &mut ItemRatingState, reliability: f64, config: &ReliabilityConfig) {
    let alpha = config.item_ema_alpha;
    item.avg_voter_reliability = ((1.0 - alpha) * item.avg_voter_reliability
        + alpha * reliability)
        .clamp(config.min, config.max);
}
