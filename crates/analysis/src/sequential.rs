//! Sequential testing with O'Brien-Fleming alpha spending
//!
//! Interim looks at an experiment spend part of the overall alpha budget. The
//! O'Brien-Fleming spending function keeps early thresholds very conservative
//! and releases the full budget only once the planned sample is collected.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::errors::{AnalysisError, Result};

/// Outcome of one interim look under an alpha-spending boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequentialCheck {
    /// Raw p-value observed at this look
    pub current_p_value: f64,
    /// Fraction of the planned sample collected so far
    pub information_fraction: f64,
    /// Alpha available at this look under the spending function
    pub alpha_spent: f64,
    /// Overall two-sided alpha budget
    pub total_alpha: f64,
    /// Whether the current p-value crosses the spent boundary
    pub significant_at_stage: bool,
}

/// O'Brien-Fleming alpha-spending boundary for interim analyses
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AlphaSpending {
    total_alpha: f64,
}

impl AlphaSpending {
    pub fn obrien_fleming(total_alpha: f64) -> Result<Self> {
        if !(total_alpha > 0.0 && total_alpha < 1.0) {
            return Err(AnalysisError::InvalidParameter(format!(
                "alpha must be in (0, 1), got {total_alpha}"
            )));
        }
        Ok(Self { total_alpha })
    }

    /// Alpha released at information fraction `t`
    ///
    /// Fractions at or below zero spend nothing; fractions at or above one
    /// release the full budget.
    pub fn alpha_at(&self, information_fraction: f64) -> f64 {
        if information_fraction.is_nan() {
            return 0.0;
        }
        if information_fraction <= 0.0 {
            return 0.0;
        }
        if information_fraction >= 1.0 {
            return self.total_alpha;
        }
        // Unit normal construction cannot fail
        let normal = Normal::new(0.0, 1.0).unwrap();
        let z_alpha = normal.inverse_cdf(1.0 - self.total_alpha / 2.0);
        let boundary = z_alpha / information_fraction.sqrt();
        2.0 * (1.0 - normal.cdf(boundary))
    }

    /// Evaluate an interim p-value against the boundary at fraction `t`
    pub fn check(&self, current_p_value: f64, information_fraction: f64) -> Result<SequentialCheck> {
        if !(0.0..=1.0).contains(&current_p_value) {
            return Err(AnalysisError::InvalidParameter(format!(
                "p-value must be in [0, 1], got {current_p_value}"
            )));
        }
        let alpha_spent = self.alpha_at(information_fraction);
        Ok(SequentialCheck {
            current_p_value,
            information_fraction,
            alpha_spent,
            total_alpha: self.total_alpha,
            significant_at_stage: current_p_value < alpha_spent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spending() -> AlphaSpending {
        AlphaSpending::obrien_fleming(0.05).unwrap()
    }

    #[test]
    fn test_full_budget_released_at_planned_sample() {
        assert_relative_eq!(spending().alpha_at(1.0), 0.05, epsilon = 1e-12);
        assert_relative_eq!(spending().alpha_at(1.5), 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_nothing_spent_before_data_arrives() {
        assert_eq!(spending().alpha_at(0.0), 0.0);
        assert_eq!(spending().alpha_at(-0.2), 0.0);
    }

    #[test]
    fn test_early_looks_are_conservative() {
        // z_{0.025} / sqrt(0.1) ~ 6.2, essentially no alpha released
        let early = spending().alpha_at(0.1);
        assert!(early < 1e-8, "spent {early}");
    }

    #[test]
    fn test_spending_is_monotone_in_information() {
        let s = spending();
        let fractions = [0.1, 0.25, 0.5, 0.75, 1.0];
        for pair in fractions.windows(2) {
            assert!(s.alpha_at(pair[0]) < s.alpha_at(pair[1]));
        }
    }

    #[test]
    fn test_halfway_boundary_matches_closed_form() {
        // 2 * (1 - Phi(1.959964 / sqrt(0.5))) = 2 * (1 - Phi(2.7718))
        assert_relative_eq!(spending().alpha_at(0.5), 0.005574, epsilon = 1e-5);
    }

    #[test]
    fn test_interim_p_value_held_to_spent_alpha() {
        let s = spending();
        // p = 0.03 clears the final threshold but not the halfway boundary
        let halfway = s.check(0.03, 0.5).unwrap();
        assert!(!halfway.significant_at_stage);
        let final_look = s.check(0.03, 1.0).unwrap();
        assert!(final_look.significant_at_stage);
    }

    #[test]
    fn test_strong_early_signal_can_stop() {
        let check = spending().check(1e-4, 0.75).unwrap();
        assert!(check.alpha_spent > 1e-4);
        assert!(check.significant_at_stage);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(AlphaSpending::obrien_fleming(0.0).is_err());
        assert!(AlphaSpending::obrien_fleming(1.0).is_err());
        assert!(spending().check(1.2, 0.5).is_err());
        assert!(spending().check(-0.1, 0.5).is_err());
    }
}
