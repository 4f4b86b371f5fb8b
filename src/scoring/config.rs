use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_GRACE_PERIOD_MINUTES, RUN_DEADLINE_MARGIN_SECS};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EloConfig {
    pub initial_rating: f64,
    pub k_factor: f64,
    pub super_vote_k_multiplier: f64,
    pub normal_vote_weight: u32,
    pub super_vote_weight: u32,
    pub initial_uncertainty: f64,
    pub uncertainty_floor: f64,
    pub uncertainty_ceiling: f64,
    pub uncertainty_decay: f64,
    pub uncertainty_shrink: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            initial_rating: 1400.0,
            k_factor: 32.0,
            super_vote_k_multiplier: 2.0,
            normal_vote_weight: 1,
            super_vote_weight: 5,
            initial_uncertainty: 350.0,
            uncertainty_floor: 50.0,
            uncertainty_ceiling: 350.0,
            uncertainty_decay: 10.0,
            uncertainty_shrink: 0.98,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliderConfig {
    pub z_clamp: f64,
    pub neutral_value: f64,
    /// Voters with fewer samples are fed through unnormalized.
    #[serde(default = "default_min_samples_for_normalization")]
    pub min_samples_for_normalization: u64,
}

fn default_min_samples_for_normalization() -> u64 {
    2
}

impl Default for SliderConfig {
    fn default() -> Self {
        Self {
            z_clamp: 2.5,
            neutral_value: 50.0,
            min_samples_for_normalization: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReliabilityConfig {
    pub initial: f64,
    pub min: f64,
    pub max: f64,
    pub aligned_target: f64,
    pub misaligned_target: f64,
    pub learning_rate: f64,
    pub min_difficulty: f64,
    /// EMA factor for the item-level average of voter reliability.
    pub item_ema_alpha: f64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            initial: 1.0,
            min: 0.5,
            max: 1.5,
            aligned_target: 1.2,
            misaligned_target: 0.8,
            learning_rate: 0.10,
            min_difficulty: 0.1,
            item_ema_alpha: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposerConfig {
    pub rating_weight: f64,
    pub slider_weight: f64,
    pub favorite_weight: f64,
    pub rating_domain_min: f64,
    pub rating_domain_max: f64,
    pub favorite_log_base: f64,
    pub confidence_uncertainty_weight: f64,
    pub confidence_comparison_weight: f64,
    pub confidence_slider_weight: f64,
    pub comparison_sufficiency_target: u64,
    pub slider_sufficiency_target: u64,
    pub provisional_min_comparisons: u64,
    pub provisional_min_sliders: u64,
    pub provisional_min_confidence: f64,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            rating_weight: 0.40,
            slider_weight: 0.30,
            favorite_weight: 0.30,
            rating_domain_min: 800.0,
            rating_domain_max: 2000.0,
            favorite_log_base: 101.0,
            confidence_uncertainty_weight: 0.40,
            confidence_comparison_weight: 0.35,
            confidence_slider_weight: 0.25,
            comparison_sufficiency_target: 30,
            slider_sufficiency_target: 10,
            provisional_min_comparisons: 5,
            provisional_min_sliders: 2,
            provisional_min_confidence: 40.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishGateConfig {
    pub min_comparisons: u64,
    pub min_distinct_opponents: usize,
    pub min_slider_ratings: u64,
    pub min_distinct_slider_raters: usize,
    pub grace_period_minutes: i64,
    pub score_delta_threshold: f64,
    pub confidence_tier_width: f64,
}

impl Default for PublishGateConfig {
    fn default() -> Self {
        Self {
            min_comparisons: 5,
            min_distinct_opponents: 3,
            min_slider_ratings: 2,
            min_distinct_slider_raters: 2,
            grace_period_minutes: 10,
            score_delta_threshold: 0.5,
            confidence_tier_width: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    pub trim_fraction: f64,
    pub min_sample_for_trim: usize,
    pub cohesion_max_penalty: f64,
    pub cohesion_std_scale: f64,
    pub target_votes_per_item: f64,
    pub coverage_fraction_weight: f64,
    pub coverage_depth_weight: f64,
    pub confidence_coverage_weight: f64,
    pub confidence_depth_weight: f64,
    pub confidence_uncertainty_weight: f64,
    /// Standard error (score points) at which the uncertainty factor reaches zero.
    pub standard_error_scale: f64,
    pub quality_weight: f64,
    pub coverage_weight: f64,
    pub provisional_min_confidence: f64,
    pub provisional_min_coverage: f64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            trim_fraction: 0.05,
            min_sample_for_trim: 10,
            cohesion_max_penalty: 0.30,
            cohesion_std_scale: 15.0,
            target_votes_per_item: 20.0,
            coverage_fraction_weight: 0.5,
            coverage_depth_weight: 0.5,
            confidence_coverage_weight: 0.4,
            confidence_depth_weight: 0.3,
            confidence_uncertainty_weight: 0.3,
            standard_error_scale: 10.0,
            quality_weight: 0.80,
            coverage_weight: 0.20,
            provisional_min_confidence: 70.0,
            provisional_min_coverage: 0.20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    pub batch_size: usize,
    pub claim_chunk_size: usize,
    pub priority_batch_size: usize,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub events_page_size: usize,
    pub item_timeout_ms: u64,
    pub soft_cap_secs: u64,
    pub claim_timeout_secs: i64,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    /// Error ratio above which the whole run is reported as failed.
    pub failure_ratio: f64,
}

impl BatchConfig {
    /// Longest a run can take: claiming stops at the soft cap, then the item
    /// in hand may use every retry attempt before the run records its report.
    pub fn run_deadline(&self) -> Duration {
        let attempts = u64::from(self.max_attempts.max(1));
        let per_item_ms = self
            .item_timeout_ms
            .saturating_add(self.retry_max_ms)
            .saturating_mul(attempts)
            .saturating_add(self.jitter_max_ms);
        Duration::from_secs(self.soft_cap_secs.saturating_add(RUN_DEADLINE_MARGIN_SECS))
            .saturating_add(Duration::from_millis(per_item_ms))
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            claim_chunk_size: 20,
            priority_batch_size: 10,
            jitter_min_ms: 20,
            jitter_max_ms: 120,
            events_page_size: 500,
            item_timeout_ms: 10_000,
            soft_cap_secs: 600,
            claim_timeout_secs: 900,
            max_attempts: 3,
            retry_base_ms: 20,
            retry_max_ms: 1_000,
            failure_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringConfig {
    #[serde(default)]
    pub elo: EloConfig,
    #[serde(default)]
    pub slider: SliderConfig,
    #[serde(default)]
    pub reliability: ReliabilityConfig,
    #[serde(default)]
    pub composer: ComposerConfig,
    #[serde(default)]
    pub publish_gate: PublishGateConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl ScoringConfig {
    pub fn from_env(env_config: &crate::config::ScoringEnvConfig) -> Result<Self, String> {
        let mut config = match &env_config.config_path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        if let Some(batch_size) = env_config.batch_size {
            config.batch.batch_size = batch_size;
        }
        if let Some(jitter_min_ms) = env_config.jitter_min_ms {
            config.batch.jitter_min_ms = jitter_min_ms;
        }
        if let Some(jitter_max_ms) = env_config.jitter_max_ms {
            config.batch.jitter_max_ms = jitter_max_ms;
        }
        if let Some(grace) = env_config.grace_period_minutes {
            config.publish_gate.grace_period_minutes = grace;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read scoring config {}: {e}", path.display()))?;
        serde_json::from_str(&raw)
            .map_err(|e| format!("failed to parse scoring config {}: {e}", path.display()))
    }

    pub fn validate(&self) -> Result<(), String> {
        // EloConfig
        if self.elo.k_factor <= 0.0 {
            return Err("elo.k_factor must be > 0".to_string());
        }
        if self.elo.super_vote_k_multiplier < 1.0 {
            return Err("elo.super_vote_k_multiplier must be >= 1".to_string());
        }
        if self.elo.normal_vote_weight == 0 || self.elo.super_vote_weight == 0 {
            return Err("elo vote weights must be > 0".to_string());
        }
        if self.elo.uncertainty_floor <= 0.0 {
            return Err("elo.uncertainty_floor must be > 0".to_string());
        }
        if self.elo.uncertainty_floor >= self.elo.uncertainty_ceiling {
            return Err("elo.uncertainty_floor must be < elo.uncertainty_ceiling".to_string());
        }
        if !(self.elo.uncertainty_floor..=self.elo.uncertainty_ceiling)
            .contains(&self.elo.initial_uncertainty)
        {
            return Err("elo.initial_uncertainty must be within [floor, ceiling]".to_string());
        }
        if self.elo.uncertainty_decay < 0.0 {
            return Err("elo.uncertainty_decay must be >= 0".to_string());
        }
        if !(0.0..1.0).contains(&self.elo.uncertainty_shrink) || self.elo.uncertainty_shrink == 0.0
        {
            return Err("elo.uncertainty_shrink must be in (0,1)".to_string());
        }

        // SliderConfig
        if self.slider.z_clamp <= 0.0 {
            return Err("slider.z_clamp must be > 0".to_string());
        }
        if !(0.0..=100.0).contains(&self.slider.neutral_value) {
            return Err("slider.neutral_value must be in [0,100]".to_string());
        }

        // ReliabilityConfig
        let rel = &self.reliability;
        if rel.min <= 0.0 || rel.min >= rel.max {
            return Err("reliability bounds must satisfy 0 < min < max".to_string());
        }
        if !(rel.min..=rel.max).contains(&rel.initial)
            || !(rel.min..=rel.max).contains(&rel.aligned_target)
            || !(rel.min..=rel.max).contains(&rel.misaligned_target)
        {
            return Err("reliability initial/targets must lie within [min,max]".to_string());
        }
        if !(0.0..=1.0).contains(&rel.learning_rate) {
            return Err("reliability.learning_rate must be in [0,1]".to_string());
        }
        if !(0.0..=1.0).contains(&rel.min_difficulty) {
            return Err("reliability.min_difficulty must be in [0,1]".to_string());
        }
        if !(0.0..=1.0).contains(&rel.item_ema_alpha) {
            return Err("reliability.item_ema_alpha must be in [0,1]".to_string());
        }

        // ComposerConfig
        let comp = &self.composer;
        if comp.rating_weight < 0.0 || comp.slider_weight < 0.0 || comp.favorite_weight < 0.0 {
            return Err("composer weights must be >= 0".to_string());
        }
        let weight_sum = comp.rating_weight + comp.slider_weight + comp.favorite_weight;
        if (weight_sum - 1.0).abs() > 0.01 {
            return Err(format!(
                "composer weights should sum to ~1.0 (got {weight_sum:.3})"
            ));
        }
        if comp.rating_domain_min >= comp.rating_domain_max {
            return Err("composer.rating_domain_min must be < rating_domain_max".to_string());
        }
        if comp.favorite_log_base <= 1.0 {
            return Err("composer.favorite_log_base must be > 1".to_string());
        }
        let confidence_sum = comp.confidence_uncertainty_weight
            + comp.confidence_comparison_weight
            + comp.confidence_slider_weight;
        if (confidence_sum - 1.0).abs() > 0.01 {
            return Err(format!(
                "composer confidence weights should sum to ~1.0 (got {confidence_sum:.3})"
            ));
        }
        if comp.comparison_sufficiency_target == 0 || comp.slider_sufficiency_target == 0 {
            return Err("composer sufficiency targets must be > 0".to_string());
        }
        if !(0.0..=100.0).contains(&comp.provisional_min_confidence) {
            return Err("composer.provisional_min_confidence must be in [0,100]".to_string());
        }

        // PublishGateConfig
        if !(0..=MAX_GRACE_PERIOD_MINUTES).contains(&self.publish_gate.grace_period_minutes) {
            return Err(format!(
                "publish_gate.grace_period_minutes must be in [0,{MAX_GRACE_PERIOD_MINUTES}]"
            ));
        }
        if self.publish_gate.score_delta_threshold < 0.0 {
            return Err("publish_gate.score_delta_threshold must be >= 0".to_string());
        }
        if self.publish_gate.confidence_tier_width <= 0.0 {
            return Err("publish_gate.confidence_tier_width must be > 0".to_string());
        }

        // CollectionConfig
        let col = &self.collection;
        if !(0.0..0.5).contains(&col.trim_fraction) {
            return Err("collection.trim_fraction must be in [0,0.5)".to_string());
        }
        if !(0.0..=1.0).contains(&col.cohesion_max_penalty) {
            return Err("collection.cohesion_max_penalty must be in [0,1]".to_string());
        }
        if col.cohesion_std_scale <= 0.0 || col.standard_error_scale <= 0.0 {
            return Err("collection scales must be > 0".to_string());
        }
        if col.target_votes_per_item <= 0.0 {
            return Err("collection.target_votes_per_item must be > 0".to_string());
        }
        if (col.coverage_fraction_weight + col.coverage_depth_weight - 1.0).abs() > 0.01 {
            return Err("collection coverage weights must sum to ~1.0".to_string());
        }
        if (col.confidence_coverage_weight
            + col.confidence_depth_weight
            + col.confidence_uncertainty_weight
            - 1.0)
            .abs()
            > 0.01
        {
            return Err("collection confidence weights must sum to ~1.0".to_string());
        }
        if (col.quality_weight + col.coverage_weight - 1.0).abs() > 0.01 {
            return Err("collection quality/coverage weights must sum to ~1.0".to_string());
        }

        // BatchConfig
        let batch = &self.batch;
        if batch.batch_size == 0 || batch.claim_chunk_size == 0 || batch.priority_batch_size == 0
        {
            return Err("batch sizes must be > 0".to_string());
        }
        if batch.jitter_min_ms > batch.jitter_max_ms {
            return Err("batch.jitter_min_ms must be <= jitter_max_ms".to_string());
        }
        if batch.events_page_size == 0 {
            return Err("batch.events_page_size must be > 0".to_string());
        }
        if batch.item_timeout_ms == 0 {
            return Err("batch.item_timeout_ms must be > 0".to_string());
        }
        if batch.claim_timeout_secs <= 0 {
            return Err("batch.claim_timeout_secs must be > 0".to_string());
        }
        if batch.soft_cap_secs == 0 {
            return Err("batch.soft_cap_secs must be > 0".to_string());
        }
        // A run that outlives its claims lets another worker take them over.
        if batch.run_deadline().as_secs() >= batch.claim_timeout_secs as u64 {
            return Err(
                "batch.soft_cap_secs plus item time must stay below claim_timeout_secs".to_string(),
            );
        }
        if batch.max_attempts == 0 {
            return Err("batch.max_attempts must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&batch.failure_ratio) {
            return Err("batch.failure_ratio must be in [0,1]".to_string());
        }

        Ok(())
    }
}
