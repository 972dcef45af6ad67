//! Welch's t-test for continuous metrics with unequal variances

use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::errors::{AnalysisError, Result};
use verilift_types::{TestMethod, TestResult};

/// One group's sufficient statistics
#[derive(Debug, Clone, Copy)]
pub struct GroupSummary {
    pub mean: f64,
    pub variance: f64,
    pub n: u64,
}

/// Welch's t-test over precomputed group summaries
#[derive(Debug, Clone)]
pub struct WelchTTest {
    control: GroupSummary,
    treatment: GroupSummary,
}

impl WelchTTest {
    /// Build from raw samples; each group needs at least two values
    pub fn from_samples(control: &[f64], treatment: &[f64]) -> Result<Self> {
        let control = summarize(control, "control")?;
        let treatment = summarize(treatment, "treatment")?;
        Self::from_summaries(control, treatment)
    }

    /// Build from precomputed mean/variance/n per group
    pub fn from_summaries(control: GroupSummary, treatment: GroupSummary) -> Result<Self> {
        for (name, group) in [("control", &control), ("treatment", &treatment)] {
            if group.n < 2 {
                return Err(AnalysisError::InsufficientData(format!(
                    "{name} group needs at least 2 observations, got {}",
                    group.n
                )));
            }
            if group.variance < 0.0 || !group.variance.is_finite() {
                return Err(AnalysisError::InvalidParameter(format!(
                    "{name} group variance is invalid: {}",
                    group.variance
                )));
            }
        }
        if control.variance == 0.0 && treatment.variance == 0.0 {
            return Err(AnalysisError::Statistical(
                "both groups have zero variance, t-statistic undefined".to_string(),
            ));
        }
        Ok(Self { control, treatment })
    }

    /// Standard error of the mean difference
    fn standard_error(&self) -> f64 {
        (self.control.variance / self.control.n as f64
            + self.treatment.variance / self.treatment.n as f64)
            .sqrt()
    }

    /// t-statistic for treatment - control
    pub fn t_statistic(&self) -> f64 {
        self.mean_difference() / self.standard_error()
    }

    /// Welch-Satterthwaite degrees of freedom
    pub fn degrees_of_freedom(&self) -> f64 {
        let vc = self.control.variance / self.control.n as f64;
        let vt = self.treatment.variance / self.treatment.n as f64;
        let nc = self.control.n as f64;
        let nt = self.treatment.n as f64;

        (vc + vt).powi(2) / (vc.powi(2) / (nc - 1.0) + vt.powi(2) / (nt - 1.0))
    }

    /// Two-tailed p-value
    pub fn p_value(&self) -> Result<f64> {
        let df = self.degrees_of_freedom();
        let t_dist = StudentsT::new(0.0, 1.0, df)
            .map_err(|e| AnalysisError::Statistical(e.to_string()))?;
        Ok(2.0 * (1.0 - t_dist.cdf(self.t_statistic().abs())))
    }

    /// Mean difference: treatment - control
    pub fn mean_difference(&self) -> f64 {
        self.treatment.mean - self.control.mean
    }

    /// Relative lift of the treatment mean over the control mean
    pub fn relative_lift(&self) -> Result<f64> {
        if self.control.mean == 0.0 {
            return Err(AnalysisError::Statistical(
                "relative lift undefined for zero control mean".to_string(),
            ));
        }
        Ok(self.mean_difference() / self.control.mean)
    }

    /// Confidence interval on the mean difference
    pub fn confidence_interval(&self, level: f64) -> Result<(f64, f64)> {
        if level <= 0.0 || level >= 1.0 {
            return Err(AnalysisError::InvalidParameter(format!(
                "confidence level must be in (0, 1), got {level}"
            )));
        }
        let df = self.degrees_of_freedom();
        let t_dist = StudentsT::new(0.0, 1.0, df)
            .map_err(|e| AnalysisError::Statistical(e.to_string()))?;
        let t_crit = t_dist.inverse_cdf(1.0 - (1.0 - level) / 2.0);

        let diff = self.mean_difference();
        let margin = t_crit * self.standard_error();
        Ok((diff - margin, diff + margin))
    }

    /// Effect size (Cohen's d with the pooled-average variance)
    pub fn cohens_d(&self) -> f64 {
        let pooled_std = ((self.control.variance + self.treatment.variance) / 2.0).sqrt();
        if pooled_std == 0.0 {
            return 0.0;
        }
        self.mean_difference() / pooled_std
    }

    /// Package as a terminal test result at the given significance level
    pub fn into_result(
        self,
        metric: impl Into<String>,
        alpha: f64,
        method: TestMethod,
    ) -> Result<TestResult> {
        let p_value = self.p_value()?;
        let (ci_lower, ci_upper) = self.confidence_interval(1.0 - alpha)?;
        Ok(TestResult {
            metric: metric.into(),
            estimate: self.relative_lift()?,
            absolute_lift: self.mean_difference(),
            ci_lower,
            ci_upper,
            p_value,
            adjusted_p_value: None,
            significant: p_value < alpha,
            method,
        })
    }
}

fn summarize(values: &[f64], name: &str) -> Result<GroupSummary> {
    let n = values.len();
    if n < 2 {
        return Err(AnalysisError::InsufficientData(format!(
            "{name} group needs at least 2 observations, got {n}"
        )));
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    Ok(GroupSummary {
        mean,
        variance,
        n: n as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identical_groups_not_significant() {
        let values: Vec<f64> = (0..50).map(|i| (i % 10) as f64).collect();
        let test = WelchTTest::from_samples(&values, &values).unwrap();
        assert_relative_eq!(test.t_statistic(), 0.0, epsilon = 1e-12);
        assert!(test.p_value().unwrap() > 0.99);
    }

    #[test]
    fn test_clear_difference_significant() {
        let control: Vec<f64> = (0..100).map(|i| 10.0 + (i % 5) as f64).collect();
        let treatment: Vec<f64> = (0..100).map(|i| 14.0 + (i % 5) as f64).collect();
        let test = WelchTTest::from_samples(&control, &treatment).unwrap();
        assert!(test.p_value().unwrap() < 0.001);
        assert_relative_eq!(test.mean_difference(), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_welch_satterthwaite_df_bounds() {
        // df lies between min(n1, n2) - 1 and n1 + n2 - 2
        let control: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let treatment: Vec<f64> = (0..10).map(|i| (i * 7 % 13) as f64).collect();
        let test = WelchTTest::from_samples(&control, &treatment).unwrap();
        let df = test.degrees_of_freedom();
        assert!(df >= 9.0);
        assert!(df <= 38.0);
    }

    #[test]
    fn test_empty_group_rejected() {
        let values = vec![1.0, 2.0, 3.0];
        assert!(matches!(
            WelchTTest::from_samples(&[], &values),
            Err(AnalysisError::InsufficientData(_))
        ));
        assert!(matches!(
            WelchTTest::from_samples(&values, &[1.0]),
            Err(AnalysisError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_zero_variance_both_groups_rejected() {
        let constant = vec![5.0; 10];
        assert!(matches!(
            WelchTTest::from_samples(&constant, &constant),
            Err(AnalysisError::Statistical(_))
        ));
    }

    #[test]
    fn test_from_summaries_matches_samples() {
        let control: Vec<f64> = vec![3.0, 5.0, 7.0, 9.0, 11.0];
        let treatment: Vec<f64> = vec![6.0, 8.0, 10.0, 12.0, 14.0];

        let from_samples = WelchTTest::from_samples(&control, &treatment).unwrap();
        let from_summaries = WelchTTest::from_summaries(
            GroupSummary {
                mean: 7.0,
                variance: 10.0,
                n: 5,
            },
            GroupSummary {
                mean: 10.0,
                variance: 10.0,
                n: 5,
            },
        )
        .unwrap();

        assert_relative_eq!(
            from_samples.t_statistic(),
            from_summaries.t_statistic(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_confidence_interval_contains_true_difference() {
        let control: Vec<f64> = (0..200).map(|i| 10.0 + (i % 7) as f64).collect();
        let treatment: Vec<f64> = (0..200).map(|i| 12.0 + (i % 7) as f64).collect();
        let test = WelchTTest::from_samples(&control, &treatment).unwrap();
        let (lower, upper) = test.confidence_interval(0.95).unwrap();
        assert!(lower < 2.0 && 2.0 < upper);
    }

    #[test]
    fn test_into_result_method_tag() {
        let control: Vec<f64> = (0..50).map(|i| 10.0 + (i % 5) as f64).collect();
        let treatment: Vec<f64> = (0..50).map(|i| 11.0 + (i % 5) as f64).collect();
        let test = WelchTTest::from_samples(&control, &treatment).unwrap();
        let result = test
            .into_result("sessions_count", 0.05, TestMethod::WelchTTestCuped)
            .unwrap();
        assert_eq!(result.method, TestMethod::WelchTTestCuped);
    }
}
