//! Sample ratio mismatch detection
//!
//! A mismatch between observed and expected variant allocation signals an
//! instrumentation or randomization bug; results from such an experiment
//! cannot be trusted regardless of what the treatment-effect tests say.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::warn;

use crate::errors::{AnalysisError, Result};
use verilift_types::Variant;

/// Default SRM p-value threshold, stricter than the usual 0.05 because a
/// missed mismatch is far more costly than a false alarm
pub const DEFAULT_SRM_THRESHOLD: f64 = 0.01;

/// Result of a chi-squared goodness-of-fit check on variant allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrmCheck {
    /// Pearson chi-squared statistic
    pub chi2_statistic: f64,
    /// Goodness-of-fit p-value
    pub p_value: f64,
    /// Observed counts in input order
    pub observed: Vec<(Variant, u64)>,
    /// Expected allocation ratios in input order
    pub expected_ratios: Vec<f64>,
    /// Observed control fraction
    pub observed_ratio: f64,
}

impl SrmCheck {
    /// Run the check against expected allocation ratios
    pub fn evaluate(observed: &[(Variant, u64)], expected_ratios: &[f64]) -> Result<Self> {
        if observed.len() < 2 {
            return Err(AnalysisError::InvalidParameter(
                "SRM check needs at least two variants".to_string(),
            ));
        }
        if observed.len() != expected_ratios.len() {
            return Err(AnalysisError::InvalidParameter(format!(
                "observed cells ({}) and expected ratios ({}) differ",
                observed.len(),
                expected_ratios.len()
            )));
        }
        let ratio_sum: f64 = expected_ratios.iter().sum();
        if expected_ratios.iter().any(|r| *r <= 0.0) || (ratio_sum - 1.0).abs() > 1e-9 {
            return Err(AnalysisError::InvalidParameter(format!(
                "expected ratios must be positive and sum to 1, got sum {ratio_sum}"
            )));
        }

        let total: u64 = observed.iter().map(|(_, n)| n).sum();
        if total == 0 {
            return Err(AnalysisError::InsufficientData(
                "no assignments observed".to_string(),
            ));
        }

        let mut chi2_statistic = 0.0;
        for ((_, count), ratio) in observed.iter().zip(expected_ratios.iter()) {
            let expected = total as f64 * ratio;
            chi2_statistic += (*count as f64 - expected).powi(2) / expected;
        }

        let df = (observed.len() - 1) as f64;
        let chi2 = ChiSquared::new(df)
            .map_err(|e| AnalysisError::Statistical(e.to_string()))?;
        let p_value = 1.0 - chi2.cdf(chi2_statistic);

        let control_count = observed
            .iter()
            .find(|(variant, _)| *variant == Variant::Control)
            .map(|(_, n)| *n)
            .unwrap_or(0);
        let observed_ratio = control_count as f64 / total as f64;

        Ok(Self {
            chi2_statistic,
            p_value,
            observed: observed.to_vec(),
            expected_ratios: expected_ratios.to_vec(),
            observed_ratio,
        })
    }

    /// Convenience constructor for a two-arm experiment
    pub fn two_arm(n_control: u64, n_treatment: u64, expected_control_ratio: f64) -> Result<Self> {
        Self::evaluate(
            &[
                (Variant::Control, n_control),
                (Variant::Treatment, n_treatment),
            ],
            &[expected_control_ratio, 1.0 - expected_control_ratio],
        )
    }

    /// Whether the allocation mismatches at the given threshold
    pub fn mismatch_detected(&self, threshold: f64) -> bool {
        let detected = self.p_value < threshold;
        if detected {
            warn!(
                chi2 = self.chi2_statistic,
                p_value = self.p_value,
                observed_ratio = self.observed_ratio,
                "sample ratio mismatch detected, investigate instrumentation"
            );
        }
        detected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_split_no_mismatch() {
        let check = SrmCheck::two_arm(5000, 5000, 0.5).unwrap();
        assert_relative_eq!(check.chi2_statistic, 0.0, epsilon = 1e-12);
        assert_relative_eq!(check.p_value, 1.0, epsilon = 1e-9);
        assert!(!check.mismatch_detected(DEFAULT_SRM_THRESHOLD));
    }

    #[test]
    fn test_small_hash_variance_tolerated() {
        let check = SrmCheck::two_arm(5002, 4998, 0.5).unwrap();
        assert!(check.p_value > 0.9);
        assert!(!check.mismatch_detected(DEFAULT_SRM_THRESHOLD));
    }

    #[test]
    fn test_gross_mismatch_detected() {
        let check = SrmCheck::two_arm(6000, 4000, 0.5).unwrap();
        assert!(check.p_value < 1e-6);
        assert!(check.mismatch_detected(DEFAULT_SRM_THRESHOLD));
    }

    #[test]
    fn test_unequal_expected_ratios() {
        // 90/10 split observed at exactly 90/10: no mismatch
        let check = SrmCheck::two_arm(9000, 1000, 0.9).unwrap();
        assert_relative_eq!(check.chi2_statistic, 0.0, epsilon = 1e-12);
        assert!(!check.mismatch_detected(DEFAULT_SRM_THRESHOLD));
    }

    #[test]
    fn test_threshold_is_conservative() {
        // A moderate imbalance: suspicious at 0.05 but not at 0.01
        let check = SrmCheck::two_arm(5110, 4890, 0.5).unwrap();
        assert!(check.p_value < 0.05);
        assert!(check.p_value > 0.01);
        assert!(!check.mismatch_detected(DEFAULT_SRM_THRESHOLD));
    }

    #[test]
    fn test_zero_total_rejected() {
        assert!(matches!(
            SrmCheck::two_arm(0, 0, 0.5),
            Err(AnalysisError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_invalid_ratios_rejected() {
        assert!(SrmCheck::evaluate(
            &[(Variant::Control, 10), (Variant::Treatment, 10)],
            &[0.7, 0.7],
        )
        .is_err());
        assert!(SrmCheck::evaluate(
            &[(Variant::Control, 10), (Variant::Treatment, 10)],
            &[1.0, 0.0],
        )
        .is_err());
    }
}
