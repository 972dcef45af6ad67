//! Core types and data models for the Verilift A/B testing platform
//!
//! This crate provides the entity rows produced by synthetic data generation
//! and consumed by the analysis suite. All rows are immutable once generated
//! and serialize cleanly to a row/column store or flat file.

pub mod dataset;
pub mod events;
pub mod experiments;
pub mod metrics;
pub mod users;

pub use dataset::Dataset;
pub use events::{EventRecord, EventType};
pub use experiments::{
    AssignmentRecord, CompletionStatus, DeviceType, FailureReason, Variant, VerificationAttempt,
    VerificationTier,
};
pub use metrics::{PreMetricRecord, TestMethod, TestResult, VariantSummary};
pub use users::{AccountType, Education, EngagementTier, Gender, UserRecord};
