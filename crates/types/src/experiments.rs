//! Experiment assignment and verification flow types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Variant label for a two-arm experiment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Control,
    Treatment,
}

impl Variant {
    /// Both variants in a stable order (control first)
    pub const ALL: [Variant; 2] = [Variant::Control, Variant::Treatment];
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Control => write!(f, "control"),
            Variant::Treatment => write!(f, "treatment"),
        }
    }
}

/// Client device type recorded at assignment time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Ios,
    Android,
}

/// A user's assignment to an experiment variant
///
/// Produced once per user per experiment; the variant is a pure function of
/// (user_id, experiment_id), so re-running assignment always reproduces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    /// User identifier
    pub user_id: Uuid,
    /// Experiment identifier
    pub experiment_id: String,
    /// Assigned variant
    pub variant: Variant,
    /// Assignment timestamp
    pub assigned_at: DateTime<Utc>,
    /// Device type at assignment
    pub device_type: DeviceType,
    /// App version at assignment
    pub app_version: String,
}

/// Verification tier (1 = email, 2 = badge/ID)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VerificationTier {
    #[serde(rename = "1")]
    Tier1,
    #[serde(rename = "2")]
    Tier2,
}

impl fmt::Display for VerificationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationTier::Tier1 => write!(f, "tier1"),
            VerificationTier::Tier2 => write!(f, "tier2"),
        }
    }
}

/// Terminal status of a verification attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    Abandoned,
    Failed,
}

/// Why an attempt did not complete
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    UserAbandoned,
    VerificationFailed,
}

/// A single verification attempt
///
/// Derived from event generation with tier-specific completion probabilities
/// that differ between variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationAttempt {
    /// User identifier
    pub user_id: Uuid,
    /// Verification tier
    pub tier: VerificationTier,
    /// When the attempt started
    pub attempted_at: DateTime<Utc>,
    /// Terminal status
    pub status: CompletionStatus,
    /// Completion timestamp (completed attempts only)
    pub completed_at: Option<DateTime<Utc>>,
    /// Seconds from attempt to completion (completed attempts only)
    pub time_to_complete_secs: Option<u32>,
    /// Failure reason (non-completed attempts only)
    pub failure_reason: Option<FailureReason>,
    /// Variant the user was assigned to
    pub variant: Variant,
}

impl VerificationAttempt {
    /// Whether the attempt completed successfully
    pub fn is_completed(&self) -> bool {
        self.status == CompletionStatus::Completed
    }
}
