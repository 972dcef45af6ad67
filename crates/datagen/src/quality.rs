//! Post-generation data quality checks
//!
//! Generation bugs look exactly like experiment pathologies (skewed splits,
//! imbalanced covariates, effects that do not match the injected lift), so
//! the generator audits its own output with the same tests the analysis
//! side runs.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::Result;
use verilift_analysis::{MetricAggregator, SrmCheck, WelchTTest};
use verilift_config::{ExperimentConfig, GenerationConfig};
use verilift_types::{Dataset, VerificationTier};

/// Relative-lift recovery tolerance; loose enough for sampling noise at the
/// default dataset size
const LIFT_TOLERANCE: f64 = 0.05;

const BALANCE_COVARIATES: [&str; 3] = ["pre_sessions", "pre_matches", "pre_messages"];

/// Covariate balance check between arms for one pre-period metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CovariateBalance {
    pub covariate: String,
    pub control_mean: f64,
    pub treatment_mean: f64,
    pub p_value: f64,
}

/// Quality audit over a freshly generated dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub srm: SrmCheck,
    pub srm_passed: bool,
    pub covariate_balance: Vec<CovariateBalance>,
    /// Tier-1 relative lift recovered from the generated attempts
    pub observed_tier1_lift: Option<f64>,
    /// Tier-1 relative lift the generator was configured to inject
    pub expected_tier1_lift: f64,
    pub lift_within_tolerance: bool,
}

impl DataQualityReport {
    pub fn build(
        dataset: &Dataset,
        generation: &GenerationConfig,
        experiment: &ExperimentConfig,
    ) -> Result<Self> {
        let split = experiment.traffic_split;
        let srm = SrmCheck::evaluate(&dataset.assignment_counts(), &[split, 1.0 - split])?;
        let srm_passed = !srm.mismatch_detected(verilift_analysis::DEFAULT_SRM_THRESHOLD);

        let mut covariate_balance = Vec::with_capacity(BALANCE_COVARIATES.len());
        for covariate in BALANCE_COVARIATES {
            let [control, treatment] = MetricAggregator::pre_covariate_means(
                &dataset.pre_metrics,
                &dataset.assignments,
                covariate,
            )?;
            if !control.is_sufficient() || !treatment.is_sufficient() {
                continue;
            }
            let test = WelchTTest::from_summaries(
                summary_group(&control),
                summary_group(&treatment),
            )?;
            covariate_balance.push(CovariateBalance {
                covariate: covariate.to_string(),
                control_mean: control.mean,
                treatment_mean: treatment.mean,
                p_value: test.p_value()?,
            });
        }

        let [(_, control_successes, control_total), (_, treatment_successes, treatment_total)] =
            MetricAggregator::completion_counts(
                &dataset.verification_attempts,
                VerificationTier::Tier1,
            );
        let observed_tier1_lift = if control_total > 0 && treatment_total > 0 {
            let control_rate = control_successes as f64 / control_total as f64;
            let treatment_rate = treatment_successes as f64 / treatment_total as f64;
            (control_rate > 0.0).then(|| treatment_rate / control_rate - 1.0)
        } else {
            None
        };
        let lift_within_tolerance = observed_tier1_lift
            .map(|observed| (observed - generation.tier1_lift).abs() <= LIFT_TOLERANCE)
            .unwrap_or(false);

        Ok(Self {
            srm,
            srm_passed,
            covariate_balance,
            observed_tier1_lift,
            expected_tier1_lift: generation.tier1_lift,
            lift_within_tolerance,
        })
    }

    /// Structural checks only; covariate balance is informational because a
    /// properly randomized dataset still fails one in twenty balance tests
    pub fn passed(&self) -> bool {
        self.srm_passed && self.lift_within_tolerance
    }

    /// Log the audit at the appropriate levels
    pub fn log(&self) {
        if self.srm_passed {
            info!(srm_p = self.srm.p_value, "assignment split consistent");
        } else {
            warn!(
                srm_p = self.srm.p_value,
                observed_ratio = self.srm.observed_ratio,
                "generated assignments fail the sample ratio check"
            );
        }
        for balance in &self.covariate_balance {
            if balance.p_value < 0.05 {
                warn!(
                    covariate = %balance.covariate,
                    control_mean = balance.control_mean,
                    treatment_mean = balance.treatment_mean,
                    p_value = balance.p_value,
                    "pre-period covariate imbalanced between arms"
                );
            }
        }
        match self.observed_tier1_lift {
            Some(observed) if self.lift_within_tolerance => {
                info!(
                    observed,
                    expected = self.expected_tier1_lift,
                    "tier-1 lift recovered within tolerance"
                );
            }
            Some(observed) => {
                warn!(
                    observed,
                    expected = self.expected_tier1_lift,
                    "recovered tier-1 lift drifted from the configured effect"
                );
            }
            None => {
                warn!("no tier-1 attempts in one or both arms");
            }
        }
    }
}

fn summary_group(summary: &verilift_types::VariantSummary) -> verilift_analysis::GroupSummary {
    verilift_analysis::GroupSummary {
        mean: summary.mean,
        variance: summary.variance.unwrap_or(0.0),
        n: summary.sample_size,
    }
}
