//! Deterministic synthetic data generation for verification experiments
//!
//! This crate is the write side of the experimentation platform: it builds a
//! complete synthetic dataset (users, pre-period metrics, hash-based variant
//! assignments, behavioral events, verification attempts) with a configured
//! ground-truth treatment effect, then audits its own output with the same
//! statistical checks the analysis side uses.

pub mod assignment;
pub mod errors;
pub mod generator;
pub mod quality;

pub use assignment::{
    validate_assignment_distribution, AssignmentDistribution, VariantAssigner, BUCKET_COUNT,
};
pub use errors::{GenerationError, Result};
pub use generator::ExperimentDataGenerator;
pub use quality::{CovariateBalance, DataQualityReport};
