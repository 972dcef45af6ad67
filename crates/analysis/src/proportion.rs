//! Two-proportion z-test for completion-rate metrics
//!
//! Tests the null hypothesis that the control and treatment completion
//! rates are equal, and reports lift with a Wald confidence interval on
//! the absolute difference.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::errors::{AnalysisError, Result};
use verilift_types::{TestMethod, TestResult};

/// Two-proportion z-test
#[derive(Debug, Clone)]
pub struct ProportionTest {
    /// Completions in control
    pub control_successes: u64,
    /// Users in control
    pub control_total: u64,
    /// Completions in treatment
    pub treatment_successes: u64,
    /// Users in treatment
    pub treatment_total: u64,
}

impl ProportionTest {
    /// Create a new test; both groups must be non-empty
    pub fn new(
        control_successes: u64,
        control_total: u64,
        treatment_successes: u64,
        treatment_total: u64,
    ) -> Result<Self> {
        if control_total == 0 || treatment_total == 0 {
            return Err(AnalysisError::InsufficientData(
                "proportion test requires observations in both groups".to_string(),
            ));
        }
        if control_successes > control_total || treatment_successes > treatment_total {
            return Err(AnalysisError::InvalidParameter(
                "successes exceed group size".to_string(),
            ));
        }
        Ok(Self {
            control_successes,
            control_total,
            treatment_successes,
            treatment_total,
        })
    }

    /// Observed (control, treatment) rates
    pub fn rates(&self) -> (f64, f64) {
        (
            self.control_successes as f64 / self.control_total as f64,
            self.treatment_successes as f64 / self.treatment_total as f64,
        )
    }

    /// Pooled rate under the null hypothesis
    pub fn pooled_rate(&self) -> f64 {
        (self.control_successes + self.treatment_successes) as f64
            / (self.control_total + self.treatment_total) as f64
    }

    /// z-statistic with the pooled standard error
    ///
    /// Both groups at 0% or 100% give zero standard error; that is no
    /// evidence of a difference, so the statistic is 0 rather than an error.
    pub fn z_statistic(&self) -> f64 {
        let (p_control, p_treatment) = self.rates();
        let p_pooled = self.pooled_rate();
        let n_control = self.control_total as f64;
        let n_treatment = self.treatment_total as f64;

        let se =
            (p_pooled * (1.0 - p_pooled) * (1.0 / n_control + 1.0 / n_treatment)).sqrt();
        if se == 0.0 {
            return 0.0;
        }
        (p_treatment - p_control) / se
    }

    /// Two-tailed p-value
    pub fn p_value(&self) -> Result<f64> {
        let z = self.z_statistic();
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| AnalysisError::Statistical(e.to_string()))?;
        Ok(2.0 * (1.0 - normal.cdf(z.abs())))
    }

    /// Absolute lift: treatment rate - control rate
    pub fn absolute_lift(&self) -> f64 {
        let (p_control, p_treatment) = self.rates();
        p_treatment - p_control
    }

    /// Relative lift: treatment rate / control rate - 1
    pub fn relative_lift(&self) -> Result<f64> {
        let (p_control, p_treatment) = self.rates();
        if p_control == 0.0 {
            return Err(AnalysisError::Statistical(
                "relative lift undefined for zero control rate".to_string(),
            ));
        }
        Ok(p_treatment / p_control - 1.0)
    }

    /// Wald confidence interval on the absolute difference (unpooled SE)
    pub fn confidence_interval(&self, level: f64) -> Result<(f64, f64)> {
        if level <= 0.0 || level >= 1.0 {
            return Err(AnalysisError::InvalidParameter(format!(
                "confidence level must be in (0, 1), got {level}"
            )));
        }
        let (p_control, p_treatment) = self.rates();
        let n_control = self.control_total as f64;
        let n_treatment = self.treatment_total as f64;

        let se = (p_control * (1.0 - p_control) / n_control
            + p_treatment * (1.0 - p_treatment) / n_treatment)
            .sqrt();

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| AnalysisError::Statistical(e.to_string()))?;
        let z = normal.inverse_cdf(1.0 - (1.0 - level) / 2.0);

        let diff = p_treatment - p_control;
        let margin = z * se;
        Ok((diff - margin, diff + margin))
    }

    /// Effect size (Cohen's h)
    pub fn effect_size(&self) -> f64 {
        let (p_control, p_treatment) = self.rates();
        2.0 * (p_treatment.sqrt().asin() - p_control.sqrt().asin())
    }

    /// Package as a terminal test result at the given significance level
    pub fn into_result(self, metric: impl Into<String>, alpha: f64) -> Result<TestResult> {
        let p_value = self.p_value()?;
        let (ci_lower, ci_upper) = self.confidence_interval(1.0 - alpha)?;
        Ok(TestResult {
            metric: metric.into(),
            estimate: self.relative_lift()?,
            absolute_lift: self.absolute_lift(),
            ci_lower,
            ci_upper,
            p_value,
            adjusted_p_value: None,
            significant: p_value < alpha,
            method: TestMethod::TwoProportionZTest,
        })
    }
}
