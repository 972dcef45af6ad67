//! Power analysis for two-proportion experiments

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::errors::{AnalysisError, Result};

/// Sample-size and power calculator for a two-sided two-proportion z-test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSizeCalculator {
    /// Baseline conversion rate in the control arm
    pub baseline_rate: f64,
    /// Minimum detectable effect, relative to baseline
    pub minimum_detectable_effect: f64,
    /// Two-sided significance level
    pub alpha: f64,
    /// Target statistical power
    pub power: f64,
}

impl SampleSizeCalculator {
    pub fn new(
        baseline_rate: f64,
        minimum_detectable_effect: f64,
        alpha: f64,
        power: f64,
    ) -> Result<Self> {
        if !(0.0..1.0).contains(&baseline_rate) || baseline_rate <= 0.0 {
            return Err(AnalysisError::InvalidParameter(format!(
                "baseline rate must be in (0, 1), got {baseline_rate}"
            )));
        }
        if minimum_detectable_effect <= 0.0 {
            return Err(AnalysisError::InvalidParameter(format!(
                "minimum detectable effect must be positive, got {minimum_detectable_effect}"
            )));
        }
        let treatment_rate = baseline_rate * (1.0 + minimum_detectable_effect);
        if treatment_rate >= 1.0 {
            return Err(AnalysisError::InvalidParameter(format!(
                "lifted rate {treatment_rate} exceeds 1.0"
            )));
        }
        if !(0.0..1.0).contains(&alpha) || alpha <= 0.0 {
            return Err(AnalysisError::InvalidParameter(format!(
                "alpha must be in (0, 1), got {alpha}"
            )));
        }
        if !(0.0..1.0).contains(&power) || power <= 0.0 {
            return Err(AnalysisError::InvalidParameter(format!(
                "power must be in (0, 1), got {power}"
            )));
        }

        Ok(Self {
            baseline_rate,
            minimum_detectable_effect,
            alpha,
            power,
        })
    }

    fn std_normal() -> Normal {
        // Unit normal construction cannot fail
        Normal::new(0.0, 1.0).unwrap()
    }

    fn pooled_variance_term(p1: f64, p2: f64) -> f64 {
        let p_bar = (p1 + p2) / 2.0;
        2.0 * p_bar * (1.0 - p_bar)
    }

    /// Required sample size per variant to detect the configured effect
    pub fn required_per_variant(&self) -> u64 {
        let normal = Self::std_normal();
        let z_alpha = normal.inverse_cdf(1.0 - self.alpha / 2.0);
        let z_beta = normal.inverse_cdf(self.power);

        let p1 = self.baseline_rate;
        let p2 = p1 * (1.0 + self.minimum_detectable_effect);
        let delta = p2 - p1;

        let n = (z_alpha + z_beta).powi(2) * Self::pooled_variance_term(p1, p2) / delta.powi(2);
        n.ceil() as u64
    }

    /// Power achieved with `n_per_variant` users in each arm, for the
    /// configured effect size
    pub fn achieved_power(&self, n_per_variant: u64) -> Result<f64> {
        if n_per_variant == 0 {
            return Err(AnalysisError::InvalidParameter(
                "sample size must be positive".to_string(),
            ));
        }
        let normal = Self::std_normal();
        let z_alpha = normal.inverse_cdf(1.0 - self.alpha / 2.0);

        let p1 = self.baseline_rate;
        let p2 = p1 * (1.0 + self.minimum_detectable_effect);
        let delta = (p2 - p1).abs();

        let se_term = (Self::pooled_variance_term(p1, p2) / n_per_variant as f64).sqrt();
        let z_beta = delta / se_term - z_alpha;
        Ok(normal.cdf(z_beta))
    }

    /// Smallest relative effect detectable at the target power with
    /// `n_per_variant` users per arm, found by bisection
    pub fn minimum_detectable_effect_for(&self, n_per_variant: u64) -> Result<f64> {
        if n_per_variant == 0 {
            return Err(AnalysisError::InvalidParameter(
                "sample size must be positive".to_string(),
            ));
        }
        // Largest admissible relative lift keeps the treatment rate below 1
        let upper_bound = (1.0 - 1e-9) / self.baseline_rate - 1.0;
        let mut lo = 1e-9;
        let mut hi = upper_bound;

        let probe = |mde: f64| -> Result<f64> {
            let calc = Self {
                minimum_detectable_effect: mde,
                ..self.clone()
            };
            calc.achieved_power(n_per_variant)
        };

        if probe(hi)? < self.power {
            return Err(AnalysisError::InsufficientData(format!(
                "{n_per_variant} users per variant cannot reach {:.0}% power at any feasible effect",
                self.power * 100.0
            )));
        }

        for _ in 0..200 {
            let mid = (lo + hi) / 2.0;
            if probe(mid)? >= self.power {
                hi = mid;
            } else {
                lo = mid;
            }
            if hi - lo < 1e-12 {
                break;
            }
        }
        Ok(hi)
    }
}
