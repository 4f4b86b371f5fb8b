//! Per-voter slider calibration.
//!
//! Each voter's raw 0–100 slider inputs are tracked with Welford's online
//! mean/variance so that a voter who rates everything "80" does not inflate the
//! items they touch. The current raw value is turned into a clamped z-score and
//! mapped back onto 0–100.

use crate::scoring::config::SliderConfig;
use crate::scoring::types::VoterCalibration;

/// Fold one raw observation into the voter's running statistics.
pub fn welford_update(voter: &mut VoterCalibration, raw: f64) {
    voter.slider_sample_count += 1;
    let n = voter.slider_sample_count as f64;
    let delta = raw - voter.slider_mean;
    voter.slider_mean += delta / n;
    let delta2 = raw - voter.slider_mean;
    voter.slider_m2 += delta * delta2;
    voter.slider_variance = if voter.slider_sample_count > 1 {
        voter.slider_m2 / (n - 1.0)
    } else {
        0.0
    };
}

/// Normalize `raw` against the voter's statistics into `[0, 100]`.
///
/// A z-score of `-z_clamp` maps to 0, `+z_clamp` to 100, 0 to 50.
pub fn normalize(voter: &VoterCalibration, raw: f64, config: &SliderConfig) -> f64 {
    let std = voter.slider_variance.sqrt();
    if voter.slider_sample_count < config.min_samples_for_normalization
        || !std.is_finite()
        || std <= f64::EPSILON
    {
        return raw.clamp(0.0, 100.0);
    }
    let z = ((raw - voter.slider_mean) / std).clamp(-config.z_clamp, config.z_clamp);
    (50.0 + z / config.z_clamp * 50.0).clamp(0.0, 100.0)
}

/// Update the voter with `raw` and return the normalized value for it.
pub fn observe(voter: &mut VoterCalibration, raw: f64, config: &SliderConfig) -> f64 {
    welford_update(voter, raw);
    normalize(voter, raw, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::config::ReliabilityConfig;

    fn voter() -> VoterCalibration {
        VoterCalibration::new("v1", &ReliabilityConfig::default())
    }

    fn two_pass(samples: &[f64]) -> (f64, f64) {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        (mean, var)
    }

    #[test]
    fn welford_matches_two_pass() {
        let samples = [72.0, 10.0, 55.5, 99.0, 0.0, 42.0, 42.0, 63.25];
        let mut v = voter();
        for s in samples {
            welford_update(&mut v, s);
        }
        let (mean, var) = two_pass(&samples);
        assert!((v.slider_mean - mean).abs() < 1e-9);
        assert!((v.slider_variance - var).abs() < 1e-9);
        assert_eq!(v.slider_sample_count, samples.len() as u64);
    }

    #[test]
    fn first_sample_passes_through() {
        let mut v = voter();
        let normalized = observe(&mut v, 83.0, &SliderConfig::default());
        assert_eq!(normalized, 83.0);
    }

    #[test]
    fn biased_voter_is_recentred() {
        let cfg = SliderConfig::default();
        let mut v = voter();
        for raw in [80.0, 82.0, 78.0, 80.0] {
            welford_update(&mut v, raw);
        }
        // Their own average maps to the middle of the scale.
        let mid = normalize(&v, v.slider_mean, &cfg);
        assert!((mid - 50.0).abs() < 1e-9);
        // A value far above their habit saturates at the clamp.
        assert_eq!(normalize(&v, 100.0, &cfg), 100.0);
        assert_eq!(normalize(&v, 0.0, &cfg), 0.0);
    }

    #[test]
    fn constant_voter_has_no_scale_evidence() {
        let cfg = SliderConfig::default();
        let mut v = voter();
        for _ in 0..5 {
            welford_update(&mut v, 70.0);
        }
        assert_eq!(v.slider_variance, 0.0);
        assert_eq!(normalize(&v, 70.0, &cfg), 70.0);
    }
}
