//! Collection Aesthetic Index: trimmed, cohesion-penalized aggregate of the
//! published scores of a collection's items.

use chrono::{DateTime, Utc};

use crate::scoring::config::CollectionConfig;
use crate::scoring::types::CollectionIndex;

/// One scored member as seen by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemberScore {
    pub score: f64,
    pub vote_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub mean: f64,
    pub std: f64,
    pub n: usize,
}

/// Mean and sample standard deviation.
pub fn moments(values: &[f64]) -> Moments {
    let n = values.len();
    if n == 0 {
        return Moments {
            mean: 0.0,
            std: 0.0,
            n,
        };
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let std = if n > 1 {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0)).sqrt()
    } else {
        0.0
    };
    Moments { mean, std, n }
}

/// Drop `trim_fraction` of the sample from each tail once the sample is large
/// enough. At least one value goes from each tail, so a sample just past the
/// threshold is trimmed too.
pub fn trimmed(values: &[f64], config: &CollectionConfig) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.len() < config.min_sample_for_trim.max(3) || config.trim_fraction <= 0.0 {
        return sorted;
    }
    let cut = ((sorted.len() as f64 * config.trim_fraction).floor() as usize).max(1);
    sorted[cut..sorted.len() - cut].to_vec()
}

pub fn cohesion_penalty(trimmed_std: f64, config: &CollectionConfig) -> f64 {
    config.cohesion_max_penalty * (trimmed_std / config.cohesion_std_scale).min(1.0)
}

pub fn aggregate(
    collection_id: &str,
    members: &[MemberScore],
    total_items: usize,
    now: DateTime<Utc>,
    config: &CollectionConfig,
) -> CollectionIndex {
    let scores: Vec<f64> = members.iter().map(|m| m.score).collect();
    let full = moments(&scores);
    let trimmed_scores = trimmed(&scores, config);
    let trim = moments(&trimmed_scores);

    let penalty = cohesion_penalty(trim.std, config);

    let total_items = total_items.max(members.len());
    let coverage_fraction = if total_items > 0 {
        (members.len() as f64 / total_items as f64).min(1.0)
    } else {
        0.0
    };
    let vote_depth_fraction = if members.is_empty() {
        0.0
    } else {
        let avg_votes =
            members.iter().map(|m| m.vote_count as f64).sum::<f64>() / members.len() as f64;
        (avg_votes / config.target_votes_per_item).min(1.0)
    };

    let coverage_score = (config.coverage_fraction_weight * coverage_fraction
        + config.coverage_depth_weight * vote_depth_fraction)
        * 100.0;

    let uncertainty_factor = if trim.n >= 2 {
        let standard_error = trim.std / (trim.n as f64).sqrt();
        1.0 - (standard_error / config.standard_error_scale).min(1.0)
    } else {
        0.0
    };

    let confidence = ((config.confidence_coverage_weight * coverage_fraction
        + config.confidence_depth_weight * vote_depth_fraction
        + config.confidence_uncertainty_weight * uncertainty_factor)
        * 100.0)
        .clamp(0.0, 100.0);

    let index_score = if members.is_empty() {
        0.0
    } else {
        (config.quality_weight * (trim.mean * (1.0 - penalty))
            + config.coverage_weight * coverage_score)
            .clamp(0.0, 100.0)
    };

    CollectionIndex {
        collection_id: collection_id.to_string(),
        index_score,
        confidence,
        provisional: confidence < config.provisional_min_confidence
            || coverage_fraction < config.provisional_min_coverage,
        mean: full.mean,
        std: full.std,
        trimmed_mean: trim.mean,
        trimmed_std: trim.std,
        cohesion_penalty: penalty,
        coverage_fraction,
        vote_depth_fraction,
        coverage_score,
        scored_items: members.len(),
        total_items,
        computed_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(scores: &[f64], votes: u64) -> Vec<MemberScore> {
        scores
            .iter()
            .map(|&score| MemberScore {
                score,
                vote_count: votes,
            })
            .collect()
    }

    #[test]
    fn identical_scores_have_no_penalty() {
        let cfg = CollectionConfig::default();
        let index = aggregate("c1", &members(&[72.0; 12], 25), 12, Utc::now(), &cfg);
        assert_eq!(index.cohesion_penalty, 0.0);
        assert!((index.trimmed_mean - 72.0).abs() < 1e-9);
        assert_eq!(index.trimmed_std, 0.0);
        // 0.8 * 72 + 0.2 * 100
        assert!((index.index_score - 77.6).abs() < 1e-9);
        assert!(!index.provisional);
    }

    #[test]
    fn trimming_discards_tails_only_for_large_samples() {
        let cfg = CollectionConfig::default();
        let mut values: Vec<f64> = (0..20).map(|i| 50.0 + i as f64 * 0.1).collect();
        values.push(100.0);
        values.push(0.0);
        let kept = trimmed(&values, &cfg);
        assert_eq!(kept.len(), 20);
        assert!(!kept.contains(&100.0) && !kept.contains(&0.0));

        let small = [0.0, 50.0, 100.0];
        assert_eq!(trimmed(&small, &cfg).len(), 3);
    }

    #[test]
    fn samples_just_past_the_threshold_lose_one_value_per_tail() {
        let cfg = CollectionConfig::default();
        let mut values = vec![60.0; 10];
        values[0] = 0.0;
        values[9] = 100.0;
        let kept = trimmed(&values, &cfg);
        assert_eq!(kept.len(), 8);
        assert!(kept.iter().all(|v| *v == 60.0));

        let nine = vec![60.0; 9];
        assert_eq!(trimmed(&nine, &cfg).len(), 9);
    }

    #[test]
    fn spread_is_penalized_multiplicatively() {
        let cfg = CollectionConfig::default();
        let tight = aggregate("tight", &members(&[70.0; 10], 25), 10, Utc::now(), &cfg);
        let mut spread_scores = vec![40.0; 5];
        spread_scores.extend(vec![100.0; 5]);
        let spread = aggregate("spread", &members(&spread_scores, 25), 10, Utc::now(), &cfg);
        assert!(spread.cohesion_penalty > 0.29);
        assert!(spread.index_score < tight.index_score);
    }

    #[test]
    fn low_coverage_is_provisional() {
        let cfg = CollectionConfig::default();
        let index = aggregate("c1", &members(&[70.0, 71.0], 40), 100, Utc::now(), &cfg);
        assert!(index.coverage_fraction < cfg.provisional_min_coverage);
        assert!(index.provisional);
    }

    #[test]
    fn empty_collection_is_provisional_zero() {
        let cfg = CollectionConfig::default();
        let index = aggregate("c1", &[], 5, Utc::now(), &cfg);
        assert_eq!(index.index_score, 0.0);
        assert!(index.provisional);
        assert_eq!(index.scored_items, 0);
    }
}
