//! End-to-end experiment analysis
//!
//! Ties the aggregator and the test suite together: one call turns a raw
//! dataset into a validity-checked, multiplicity-corrected report with a
//! ship/no-ship recommendation.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregate::MetricAggregator;
use crate::cuped::CupedAdjustment;
use crate::errors::{AnalysisError, Result};
use crate::fdr::{benjamini_hochberg, FdrCorrection};
use crate::power::SampleSizeCalculator;
use crate::proportion::ProportionTest;
use crate::srm::SrmCheck;
use crate::welch::WelchTTest;
use verilift_config::PlatformConfig;
use verilift_types::{Dataset, TestMethod, TestResult, Variant, VerificationTier};

/// Launch decision derived from the analyzed results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Assignment counts are inconsistent with the configured split; fix
    /// instrumentation before reading any metric
    InvestigateSrm,
    /// Primary metric significantly improved after correction
    Ship,
    /// Primary metric significantly regressed after correction
    DoNotShip,
    /// No corrected significance on the primary metric yet
    KeepRunning,
}

/// Pre-registered design held against the sample actually collected
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignCheck {
    /// Per-variant sample size the registered alpha/power/MDE call for
    pub required_per_variant: u64,
    /// Smallest assigned arm in the dataset
    pub smallest_arm: u64,
    /// Whether every arm meets the registered sample size
    pub adequately_powered: bool,
}

/// Full output of one analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    /// Experiment this report covers
    pub experiment_id: String,
    /// Sample ratio mismatch check on assignment counts
    pub srm: SrmCheck,
    /// Registered design versus collected sample
    pub design: DesignCheck,
    /// Whether the SRM check failed at the configured threshold
    pub srm_mismatch: bool,
    /// Per-metric test results, adjusted p-values filled in
    pub results: Vec<TestResult>,
    /// The multiplicity correction applied across `results`
    pub correction: Option<FdrCorrection>,
    /// Launch decision
    pub recommendation: Recommendation,
}

impl ExperimentReport {
    /// Result row for a given metric, if it was analyzable
    pub fn result_for(&self, metric: &str) -> Option<&TestResult> {
        self.results.iter().find(|result| result.metric == metric)
    }
}

/// Runs the full analysis pipeline against a dataset
#[derive(Debug, Clone)]
pub struct ExperimentAnalyzer {
    config: PlatformConfig,
}

impl ExperimentAnalyzer {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Analyze a dataset end to end
    ///
    /// Metrics that cannot be tested (undersampled, degenerate) are skipped
    /// with a warning rather than failing the whole run; only structural
    /// problems (no assignments at all) are hard errors.
    pub fn analyze(&self, dataset: &Dataset) -> Result<ExperimentReport> {
        let analysis = &self.config.analysis;
        let split = self.config.experiment.traffic_split;

        let counts = dataset.assignment_counts();
        let srm = SrmCheck::evaluate(&counts, &[split, 1.0 - split])?;
        let srm_mismatch = srm.mismatch_detected(analysis.srm_threshold);
        info!(
            experiment_id = %self.config.experiment.experiment_id,
            n_control = counts[0].1,
            n_treatment = counts[1].1,
            srm_p = srm.p_value,
            "assignment counts checked"
        );
        let design = self.design_check(&counts)?;

        let mut results = Vec::new();
        for metric in self.metrics_in_order() {
            match self.test_metric(dataset, &metric) {
                Ok(result) => {
                    debug!(
                        metric = %metric,
                        estimate = result.estimate,
                        p_value = result.p_value,
                        "metric tested"
                    );
                    results.push(result);
                }
                Err(error) => {
                    warn!(metric = %metric, %error, "metric skipped");
                }
            }
        }

        let correction = if results.is_empty() {
            None
        } else {
            let p_values: Vec<f64> = results.iter().map(|result| result.p_value).collect();
            let correction = benjamini_hochberg(&p_values, analysis.alpha)?;
            for (result, (adjusted, rejected)) in results.iter_mut().zip(
                correction
                    .adjusted
                    .iter()
                    .zip(correction.rejected.iter()),
            ) {
                result.adjusted_p_value = Some(*adjusted);
                result.significant = *rejected;
            }
            Some(correction)
        };

        let recommendation = self.recommend(srm_mismatch, &results);
        info!(
            experiment_id = %self.config.experiment.experiment_id,
            ?recommendation,
            n_results = results.len(),
            "analysis complete"
        );

        Ok(ExperimentReport {
            experiment_id: self.config.experiment.experiment_id.clone(),
            srm,
            design,
            srm_mismatch,
            results,
            correction,
            recommendation,
        })
    }

    /// Compare assigned arm sizes against the registered alpha/power/MDE
    fn design_check(&self, counts: &[(Variant, u64); 2]) -> Result<DesignCheck> {
        let experiment = &self.config.experiment;
        let calculator = SampleSizeCalculator::new(
            self.config.generation.tier1_baseline_rate,
            experiment.mde,
            experiment.alpha,
            experiment.power,
        )?;
        let required_per_variant = calculator.required_per_variant();
        let smallest_arm = counts.iter().map(|(_, n)| *n).min().unwrap_or(0);
        let adequately_powered = smallest_arm >= required_per_variant;
        if !adequately_powered {
            warn!(
                required_per_variant,
                smallest_arm, "collected sample is below the registered design size"
            );
        }
        Ok(DesignCheck {
            required_per_variant,
            smallest_arm,
            adequately_powered,
        })
    }

    fn metrics_in_order(&self) -> Vec<String> {
        let analysis = &self.config.analysis;
        let mut metrics = vec![analysis.primary_metric.clone()];
        for metric in &analysis.secondary_metrics {
            if !metrics.contains(metric) {
                metrics.push(metric.clone());
            }
        }
        metrics
    }

    fn test_metric(&self, dataset: &Dataset, metric: &str) -> Result<TestResult> {
        match metric {
            "tier1_completion_rate" => {
                self.completion_test(dataset, VerificationTier::Tier1, metric)
            }
            "tier2_completion_rate" => {
                self.completion_test(dataset, VerificationTier::Tier2, metric)
            }
            "sessions_count" => self.sessions_test(dataset, metric),
            "session_minutes" => self.session_minutes_test(dataset, metric),
            "time_to_complete_tier1" => {
                self.time_test(dataset, VerificationTier::Tier1, metric)
            }
            "time_to_complete_tier2" => {
                self.time_test(dataset, VerificationTier::Tier2, metric)
            }
            other => Err(AnalysisError::InvalidParameter(format!(
                "unknown metric {other}"
            ))),
        }
    }

    fn completion_test(
        &self,
        dataset: &Dataset,
        tier: VerificationTier,
        metric: &str,
    ) -> Result<TestResult> {
        let [(_, control_successes, control_total), (_, treatment_successes, treatment_total)] =
            MetricAggregator::completion_counts(&dataset.verification_attempts, tier);
        self.check_sample_size(metric, control_total.min(treatment_total))?;
        ProportionTest::new(
            control_successes,
            control_total,
            treatment_successes,
            treatment_total,
        )?
        .into_result(metric, self.config.analysis.alpha)
    }

    fn time_test(
        &self,
        dataset: &Dataset,
        tier: VerificationTier,
        metric: &str,
    ) -> Result<TestResult> {
        let times = MetricAggregator::time_to_complete(&dataset.verification_attempts, tier);
        let (control, treatment) = MetricAggregator::split_by_variant(&times);
        WelchTTest::from_samples(&control, &treatment)?.into_result(
            metric,
            self.config.analysis.alpha,
            TestMethod::WelchTTest,
        )
    }

    fn sessions_test(&self, dataset: &Dataset, metric: &str) -> Result<TestResult> {
        let analysis = &self.config.analysis;
        let per_user = MetricAggregator::sessions_per_user(&dataset.events, &dataset.assignments);

        let covariate = analysis
            .cuped_covariates
            .get(metric)
            .filter(|_| analysis.use_cuped);

        if let Some(covariate) = covariate {
            let (post, pre, variants) =
                MetricAggregator::aligned_covariate(&per_user, &dataset.pre_metrics, covariate)?;
            match CupedAdjustment::fit_with_variants(&post, &pre, &variants) {
                Ok(adjustment) => {
                    debug!(
                        metric = %metric,
                        covariate = %covariate,
                        theta = adjustment.theta,
                        variance_reduction = adjustment.variance_reduction,
                        "cuped adjustment applied"
                    );
                    let labeled: Vec<(Variant, f64)> = variants
                        .iter()
                        .copied()
                        .zip(adjustment.adjusted.iter().copied())
                        .collect();
                    let (control, treatment) = MetricAggregator::split_by_variant(&labeled);
                    return WelchTTest::from_samples(&control, &treatment)?.into_result(
                        metric,
                        analysis.alpha,
                        TestMethod::WelchTTestCuped,
                    );
                }
                Err(AnalysisError::DegenerateCovariate(reason)) => {
                    warn!(
                        metric = %metric,
                        covariate = %covariate,
                        %reason,
                        "covariate degenerate, falling back to unadjusted test"
                    );
                }
                Err(other) => return Err(other),
            }
        }

        let labeled: Vec<(Variant, f64)> = per_user
            .iter()
            .map(|(_, variant, value)| (*variant, *value))
            .collect();
        let (control, treatment) = MetricAggregator::split_by_variant(&labeled);
        WelchTTest::from_samples(&control, &treatment)?.into_result(
            metric,
            analysis.alpha,
            TestMethod::WelchTTest,
        )
    }

    fn session_minutes_test(&self, dataset: &Dataset, metric: &str) -> Result<TestResult> {
        let per_user =
            MetricAggregator::session_minutes_per_user(&dataset.events, &dataset.assignments);
        let labeled: Vec<(Variant, f64)> = per_user
            .iter()
            .map(|(_, variant, minutes)| (*variant, *minutes))
            .collect();
        let (control, treatment) = MetricAggregator::split_by_variant(&labeled);
        WelchTTest::from_samples(&control, &treatment)?.into_result(
            metric,
            self.config.analysis.alpha,
            TestMethod::WelchTTest,
        )
    }

    fn check_sample_size(&self, metric: &str, smallest_arm: u64) -> Result<()> {
        let min = self.config.analysis.min_sample_size;
        if smallest_arm < min {
            return Err(AnalysisError::InsufficientData(format!(
                "{metric}: smallest arm has {smallest_arm} observations, need {min}"
            )));
        }
        Ok(())
    }

    fn recommend(&self, srm_mismatch: bool, results: &[TestResult]) -> Recommendation {
        if srm_mismatch {
            return Recommendation::InvestigateSrm;
        }
        let primary = results
            .iter()
            .find(|result| result.metric == self.config.analysis.primary_metric);
        match primary {
            Some(result) if result.significant && result.estimate > 0.0 => Recommendation::Ship,
            Some(result) if result.significant => Recommendation::DoNotShip,
            _ => Recommendation::KeepRunning,
        }
    }
}
