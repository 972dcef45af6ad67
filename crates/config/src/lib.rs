//! Configuration management for the Verilift A/B testing platform
//!
//! All configuration is carried in immutable structs passed by value into
//! the generator and analyzer; there is no process-wide mutable state.

use chrono::NaiveDate;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Experiment identity and design parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Experiment identifier, hashed into every assignment
    pub experiment_id: String,

    /// Human-readable name
    pub experiment_name: String,

    /// First day of the experiment window
    pub start_date: NaiveDate,

    /// Length of the experiment window in days
    pub duration_days: u32,

    /// Significance level (Type I error rate)
    pub alpha: f64,

    /// Target statistical power (1 - Type II error rate)
    pub power: f64,

    /// Minimum detectable effect, relative (0.15 = 15%)
    pub mde: f64,

    /// Expected control-group traffic fraction
    pub traffic_split: f64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            experiment_id: "verification_v1".to_string(),
            experiment_name: "Two-Tier Verification Optimization".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 7, 1).expect("valid date"),
            duration_days: 14,
            alpha: 0.05,
            power: 0.80,
            mde: 0.15,
            traffic_split: 0.5,
        }
    }
}

/// Synthetic data generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Number of users to generate
    pub user_count: usize,

    /// Seed for the deterministic random stream
    pub random_seed: u64,

    /// Inclusive age bounds for demographic draws
    pub age_range: (u8, u8),

    /// Candidate home cities with draw weights
    pub locations: Vec<(String, f64)>,

    /// Education level draw weights (bachelors, masters, phd, other)
    pub education_weights: [f64; 4],

    /// Gender draw weights (male, female, non-binary)
    pub gender_weights: [f64; 3],

    /// Engagement tier draw weights (power, regular, casual, churned)
    pub engagement_weights: [f64; 4],

    /// Fraction of premium accounts
    pub premium_rate: f64,

    /// Mean days between signup and experiment start
    pub signup_recency_days: f64,

    /// Gamma shape for pre-period session counts
    pub pre_sessions_shape: f64,

    /// Gamma scale for pre-period session counts
    pub pre_sessions_scale: f64,

    /// Probability a user starts tier-1 verification
    pub tier1_start_rate: f64,

    /// Baseline tier-1 completion probability (control)
    pub tier1_baseline_rate: f64,

    /// Relative tier-1 treatment lift
    pub tier1_lift: f64,

    /// Probability a tier-1 completer starts tier-2
    pub tier2_start_rate: f64,

    /// Baseline tier-2 completion probability (control)
    pub tier2_baseline_rate: f64,

    /// Relative tier-2 treatment lift
    pub tier2_lift: f64,

    /// Relative treatment lift on session counts
    pub engagement_lift: f64,

    /// Weekend traffic multiplier for day-of-week variance
    pub weekend_multiplier: f64,

    /// Share of sessions landing in the 18-22h evening peak
    pub evening_peak_share: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            user_count: 50_000,
            random_seed: 42,
            age_range: (18, 60),
            locations: vec![
                ("New York".to_string(), 0.15),
                ("Los Angeles".to_string(), 0.13),
                ("Chicago".to_string(), 0.10),
                ("Houston".to_string(), 0.09),
                ("Phoenix".to_string(), 0.08),
                ("Philadelphia".to_string(), 0.08),
                ("San Antonio".to_string(), 0.07),
                ("San Diego".to_string(), 0.07),
                ("Dallas".to_string(), 0.12),
                ("Austin".to_string(), 0.11),
            ],
            education_weights: [0.225, 0.45, 0.135, 0.10],
            gender_weights: [0.51, 0.47, 0.02],
            engagement_weights: [0.10, 0.60, 0.20, 0.10],
            premium_rate: 0.07,
            signup_recency_days: 60.0,
            pre_sessions_shape: 2.0,
            pre_sessions_scale: 3.0,
            tier1_start_rate: 0.75,
            tier1_baseline_rate: 0.40,
            tier1_lift: 0.15,
            tier2_start_rate: 0.80,
            tier2_baseline_rate: 0.25,
            tier2_lift: 0.20,
            engagement_lift: 0.12,
            weekend_multiplier: 1.3,
            evening_peak_share: 0.4,
        }
    }
}

/// Statistical analysis parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Significance level for treatment-effect tests
    pub alpha: f64,

    /// Target statistical power
    pub power: f64,

    /// Apply CUPED variance reduction to continuous metrics
    pub use_cuped: bool,

    /// SRM detection threshold; stricter than alpha on purpose
    pub srm_threshold: f64,

    /// Minimum per-variant sample size before testing
    pub min_sample_size: u64,

    /// Metric that drives the ship/no-ship recommendation
    pub primary_metric: String,

    /// Additional metrics analyzed alongside the primary
    pub secondary_metrics: Vec<String>,

    /// Post-period metric -> pre-period CUPED covariate
    pub cuped_covariates: BTreeMap<String, String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let mut cuped_covariates = BTreeMap::new();
        cuped_covariates.insert("sessions_count".to_string(), "pre_sessions".to_string());

        Self {
            alpha: 0.05,
            power: 0.80,
            use_cuped: true,
            srm_threshold: 0.01,
            min_sample_size: 1000,
            primary_metric: "tier1_completion_rate".to_string(),
            secondary_metrics: vec![
                "tier2_completion_rate".to_string(),
                "sessions_count".to_string(),
                "session_minutes".to_string(),
                "time_to_complete_tier1".to_string(),
            ],
            cuped_covariates,
        }
    }
}

/// Top-level platform configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Experiment design
    pub experiment: ExperimentConfig,

    /// Data generation parameters
    pub generation: GenerationConfig,

    /// Analysis parameters
    pub analysis: AnalysisConfig,
}

impl PlatformConfig {
    /// Load configuration from an optional YAML file and the environment
    ///
    /// Environment variables prefixed with `VERILIFT_` override file values,
    /// with `__` separating nesting levels.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(PlatformConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(Env::prefixed("VERILIFT_").split("__"));

        let config: PlatformConfig = figment
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.experiment.validate()?;
        self.generation.validate()?;
        self.analysis.validate()?;
        Ok(())
    }
}

impl ExperimentConfig {
    /// Validate design parameters
    pub fn validate(&self) -> Result<()> {
        if self.experiment_id.is_empty() {
            return Err(ConfigError::ValidationError(
                "experiment_id must not be empty".to_string(),
            ));
        }
        if self.duration_days == 0 {
            return Err(ConfigError::ValidationError(
                "duration_days must be positive".to_string(),
            ));
        }
        check_open_unit("alpha", self.alpha)?;
        check_open_unit("power", self.power)?;
        check_open_unit("traffic_split", self.traffic_split)?;
        if self.mde <= 0.0 {
            return Err(ConfigError::ValidationError(
                "mde must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl GenerationConfig {
    /// Validate generation parameters
    pub fn validate(&self) -> Result<()> {
        if self.user_count == 0 {
            return Err(ConfigError::ValidationError(
                "user_count must be positive".to_string(),
            ));
        }
        if self.age_range.0 >= self.age_range.1 {
            return Err(ConfigError::ValidationError(format!(
                "age_range ({}, {}) must be increasing",
                self.age_range.0, self.age_range.1
            )));
        }
        for (name, rate) in [
            ("premium_rate", self.premium_rate),
            ("tier1_start_rate", self.tier1_start_rate),
            ("tier1_baseline_rate", self.tier1_baseline_rate),
            ("tier2_start_rate", self.tier2_start_rate),
            ("tier2_baseline_rate", self.tier2_baseline_rate),
        ] {
            check_closed_unit(name, rate)?;
        }
        // Lifted rates must still be probabilities
        check_closed_unit(
            "tier1_baseline_rate * (1 + tier1_lift)",
            self.tier1_baseline_rate * (1.0 + self.tier1_lift),
        )?;
        check_closed_unit(
            "tier2_baseline_rate * (1 + tier2_lift)",
            self.tier2_baseline_rate * (1.0 + self.tier2_lift),
        )?;
        // CUPED needs covariate variance downstream
        if self.pre_sessions_shape <= 0.0 || self.pre_sessions_scale <= 0.0 {
            return Err(ConfigError::ValidationError(
                "pre-period session distribution is degenerate (zero variance)".to_string(),
            ));
        }
        if self.locations.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one location is required".to_string(),
            ));
        }
        if self.weekend_multiplier <= 0.0 {
            return Err(ConfigError::ValidationError(
                "weekend_multiplier must be positive".to_string(),
            ));
        }
        check_closed_unit("evening_peak_share", self.evening_peak_share)?;
        Ok(())
    }
}

impl AnalysisConfig {
    /// Validate analysis parameters
    pub fn validate(&self) -> Result<()> {
        check_open_unit("alpha", self.alpha)?;
        check_open_unit("power", self.power)?;
        check_open_unit("srm_threshold", self.srm_threshold)?;
        if self.primary_metric.is_empty() {
            return Err(ConfigError::ValidationError(
                "primary_metric must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_open_unit(name: &str, value: f64) -> Result<()> {
    if value <= 0.0 || value >= 1.0 {
        return Err(ConfigError::ValidationError(format!(
            "{name} must be in (0, 1), got {value}"
        )));
    }
    Ok(())
}

fn check_closed_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ValidationError(format!(
            "{name} must be in [0, 1], got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PlatformConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_user_count_rejected() {
        let mut config = GenerationConfig::default();
        config.user_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_out_of_bounds_rejected() {
        let mut config = GenerationConfig::default();
        config.tier1_baseline_rate = 1.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lifted_rate_above_one_rejected() {
        let mut config = GenerationConfig::default();
        config.tier1_baseline_rate = 0.9;
        config.tier1_lift = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_degenerate_pre_distribution_rejected() {
        let mut config = GenerationConfig::default();
        config.pre_sessions_scale = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_alpha_rejected() {
        let mut config = AnalysisConfig::default();
        config.alpha = 0.0;
        assert!(config.validate().is_err());

        config.alpha = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_experiment_id_rejected() {
        let mut config = ExperimentConfig::default();
        config.experiment_id.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_defaults_without_file() {
        let config = PlatformConfig::load(None).unwrap();
        assert_eq!(config.experiment.experiment_id, "verification_v1");
        assert_eq!(config.generation.random_seed, 42);
    }
}
