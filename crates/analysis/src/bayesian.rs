//! Bayesian companion analysis for conversion metrics
//!
//! Frequentist p-values answer "how surprising is this data under no
//! effect"; stakeholders usually want "how likely is treatment to be
//! better". A Beta-Binomial model answers the latter directly.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Beta as BetaSampler;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Beta, ContinuousCDF};

use crate::errors::{AnalysisError, Result};

const MONTE_CARLO_DRAWS: usize = 100_000;

/// Beta-Binomial comparison of two conversion rates under a uniform prior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BayesianProportionTest {
    control_alpha: f64,
    control_beta: f64,
    treatment_alpha: f64,
    treatment_beta: f64,
    seed: u64,
}

/// Posterior summary produced by [`BayesianProportionTest::summarize`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BayesianSummary {
    /// P(treatment rate > control rate) under the posteriors
    pub probability_treatment_beats_control: f64,
    /// Posterior mean conversion rate per arm
    pub control_posterior_mean: f64,
    pub treatment_posterior_mean: f64,
    /// Equal-tailed credible interval on the treatment rate
    pub treatment_credible_interval: (f64, f64),
    /// Expected conversion-rate loss from shipping treatment when control
    /// is actually better
    pub expected_loss: f64,
}

impl BayesianProportionTest {
    /// Build posteriors from observed successes and totals, Beta(1, 1) prior
    pub fn new(
        control_successes: u64,
        control_total: u64,
        treatment_successes: u64,
        treatment_total: u64,
        seed: u64,
    ) -> Result<Self> {
        if control_total == 0 || treatment_total == 0 {
            return Err(AnalysisError::InsufficientData(
                "both arms need at least one observation".to_string(),
            ));
        }
        if control_successes > control_total || treatment_successes > treatment_total {
            return Err(AnalysisError::InvalidParameter(
                "successes cannot exceed total".to_string(),
            ));
        }

        Ok(Self {
            control_alpha: 1.0 + control_successes as f64,
            control_beta: 1.0 + (control_total - control_successes) as f64,
            treatment_alpha: 1.0 + treatment_successes as f64,
            treatment_beta: 1.0 + (treatment_total - treatment_successes) as f64,
            seed,
        })
    }

    /// Monte Carlo estimate of P(treatment > control), deterministic for a
    /// fixed seed
    pub fn probability_treatment_beats_control(&self) -> Result<f64> {
        let control = BetaSampler::new(self.control_alpha, self.control_beta)
            .map_err(|e| AnalysisError::Statistical(e.to_string()))?;
        let treatment = BetaSampler::new(self.treatment_alpha, self.treatment_beta)
            .map_err(|e| AnalysisError::Statistical(e.to_string()))?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut wins = 0usize;
        for _ in 0..MONTE_CARLO_DRAWS {
            let c: f64 = rng.sample(control);
            let t: f64 = rng.sample(treatment);
            if t > c {
                wins += 1;
            }
        }
        Ok(wins as f64 / MONTE_CARLO_DRAWS as f64)
    }

    /// Equal-tailed credible interval on the treatment conversion rate
    pub fn treatment_credible_interval(&self, level: f64) -> Result<(f64, f64)> {
        if !(0.0..1.0).contains(&level) || level <= 0.0 {
            return Err(AnalysisError::InvalidParameter(format!(
                "credible level must be in (0, 1), got {level}"
            )));
        }
        let posterior = Beta::new(self.treatment_alpha, self.treatment_beta)
            .map_err(|e| AnalysisError::Statistical(e.to_string()))?;
        let tail = (1.0 - level) / 2.0;
        Ok((posterior.inverse_cdf(tail), posterior.inverse_cdf(1.0 - tail)))
    }

    /// Full posterior summary at a 95% credible level
    pub fn summarize(&self) -> Result<BayesianSummary> {
        let control = BetaSampler::new(self.control_alpha, self.control_beta)
            .map_err(|e| AnalysisError::Statistical(e.to_string()))?;
        let treatment = BetaSampler::new(self.treatment_alpha, self.treatment_beta)
            .map_err(|e| AnalysisError::Statistical(e.to_string()))?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut wins = 0usize;
        let mut loss_sum = 0.0;
        for _ in 0..MONTE_CARLO_DRAWS {
            let c: f64 = rng.sample(control);
            let t: f64 = rng.sample(treatment);
            if t > c {
                wins += 1;
            } else {
                loss_sum += c - t;
            }
        }

        Ok(BayesianSummary {
            probability_treatment_beats_control: wins as f64 / MONTE_CARLO_DRAWS as f64,
            control_posterior_mean: self.control_alpha / (self.control_alpha + self.control_beta),
            treatment_posterior_mean: self.treatment_alpha
                / (self.treatment_alpha + self.treatment_beta),
            treatment_credible_interval: self.treatment_credible_interval(0.95)?,
            expected_loss: loss_sum / MONTE_CARLO_DRAWS as f64,
        })
    }
}
