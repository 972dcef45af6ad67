//! Statistical analysis suite for verification experiments
//!
//! This crate provides the read side of the experimentation platform: metric
//! aggregation over raw dataset rows, the frequentist test suite (two-proportion
//! z-test, Welch's t-test, CUPED variance reduction, Benjamini-Hochberg FDR
//! control, sample-ratio-mismatch detection, power analysis, sequential alpha
//! spending), a Bayesian companion model, and the end-to-end analyzer that
//! turns a dataset into a launch recommendation.

pub mod aggregate;
pub mod analyzer;
pub mod bayesian;
pub mod cuped;
pub mod errors;
pub mod fdr;
pub mod power;
pub mod proportion;
pub mod sequential;
pub mod srm;
pub mod welch;

pub use aggregate::{completion_metric_name, time_metric_name, MetricAggregator};
pub use analyzer::{DesignCheck, ExperimentAnalyzer, ExperimentReport, Recommendation};
pub use bayesian::{BayesianProportionTest, BayesianSummary};
pub use cuped::CupedAdjustment;
pub use errors::{AnalysisError, Result};
pub use fdr::{benjamini_hochberg, FdrCorrection};
pub use power::SampleSizeCalculator;
pub use proportion::ProportionTest;
pub use sequential::{AlphaSpending, SequentialCheck};
pub use srm::{SrmCheck, DEFAULT_SRM_THRESHOLD};
pub use welch::{GroupSummary, WelchTTest};
