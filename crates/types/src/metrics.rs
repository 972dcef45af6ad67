//! Metric rows: pre-period covariates, per-variant summaries, test results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::experiments::Variant;

/// Pre-experiment behavioral counters for one user
///
/// Drawn from distributions correlated with post-period outcomes; this
/// correlation is what the CUPED adjustment exploits. All counts are
/// non-negative integers by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreMetricRecord {
    /// User identifier
    pub user_id: Uuid,
    /// Start of the pre-period window
    pub period_start: DateTime<Utc>,
    /// End of the pre-period window
    pub period_end: DateTime<Utc>,
    /// Sessions in the pre-period
    pub pre_sessions: u32,
    /// Matches in the pre-period
    pub pre_matches: u32,
    /// Messages sent in the pre-period
    pub pre_messages: u32,
    /// Minutes on app in the pre-period
    pub pre_time_minutes: u32,
    /// Profile views in the pre-period
    pub pre_profile_views: u32,
}

/// Aggregated metric row for one (variant, metric) pair
///
/// Computed on demand from event/attempt records, never stored as source of
/// truth. An undefined variance (fewer than two observations) is represented
/// as `None` rather than NaN so callers cannot misread a sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantSummary {
    /// Variant this row summarizes
    pub variant: Variant,
    /// Metric name
    pub metric: String,
    /// Number of observations
    pub sample_size: u64,
    /// Sum over observations (successes for binary metrics)
    pub sum: f64,
    /// Sample mean (0.0 when there are no observations)
    pub mean: f64,
    /// Sample variance (ddof = 1); `None` when undefined
    pub variance: Option<f64>,
}

impl VariantSummary {
    /// An empty summary for a variant with zero observations
    pub fn empty(variant: Variant, metric: impl Into<String>) -> Self {
        Self {
            variant,
            metric: metric.into(),
            sample_size: 0,
            sum: 0.0,
            mean: 0.0,
            variance: None,
        }
    }

    /// Whether the row holds enough data for variance-based tests
    pub fn is_sufficient(&self) -> bool {
        self.sample_size >= 2 && self.variance.is_some()
    }
}

/// Statistical method that produced a test result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestMethod {
    TwoProportionZTest,
    WelchTTest,
    WelchTTestCuped,
}

/// Terminal output of the statistical test suite for one metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// Metric name
    pub metric: String,
    /// Relative lift: treatment / control - 1
    pub estimate: f64,
    /// Absolute difference: treatment - control
    pub absolute_lift: f64,
    /// Lower bound of the CI on the absolute difference
    pub ci_lower: f64,
    /// Upper bound of the CI on the absolute difference
    pub ci_upper: f64,
    /// Raw two-tailed p-value
    pub p_value: f64,
    /// Multiplicity-adjusted p-value, when a correction was applied
    pub adjusted_p_value: Option<f64>,
    /// Significance after correction (raw significance when uncorrected)
    pub significant: bool,
    /// Method used
    pub method: TestMethod,
}

impl TestResult {
    /// p-value to use for decisions: adjusted when available, raw otherwise
    pub fn decision_p_value(&self) -> f64 {
        self.adjusted_p_value.unwrap_or(self.p_value)
    }
}
