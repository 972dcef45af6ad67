//! User demographic types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Gender of a generated user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
}

/// Highest completed education level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Education {
    Bachelors,
    Masters,
    Phd,
    Other,
}

/// Account subscription type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Free,
    Premium,
}

/// Engagement tier used to shape behavioral draws during generation
///
/// Power users generate roughly 3x the baseline activity, churned users
/// almost none. The tier stays on the row so analysis can stratify by it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EngagementTier {
    Power,
    Regular,
    Casual,
    Churned,
}

impl EngagementTier {
    /// Activity multiplier applied to all behavioral draws for this tier
    pub fn activity_multiplier(&self) -> f64 {
        match self {
            EngagementTier::Power => 3.0,
            EngagementTier::Regular => 1.0,
            EngagementTier::Casual => 0.3,
            EngagementTier::Churned => 0.05,
        }
    }
}

/// A single generated user
///
/// One record per `user_id`; age is bounded by the generation config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique user identifier
    pub user_id: Uuid,
    /// Signup timestamp (before experiment start)
    pub signup_date: DateTime<Utc>,
    /// Age in years
    pub age: u8,
    /// Gender
    pub gender: Gender,
    /// Home city
    pub location: String,
    /// Education level
    pub education: Education,
    /// Free or premium account
    pub account_type: AccountType,
    /// Engagement tier driving behavioral draws
    pub engagement_tier: EngagementTier,
}
