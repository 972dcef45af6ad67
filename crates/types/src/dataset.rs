//! The complete output of one deterministic generation run

use serde::{Deserialize, Serialize};

use crate::events::EventRecord;
use crate::experiments::{AssignmentRecord, Variant, VerificationAttempt};
use crate::metrics::PreMetricRecord;
use crate::users::UserRecord;

/// All entity tables produced by one seeded generation run
///
/// The generator exclusively owns creation of these rows; nothing mutates
/// them afterwards. Identical seed and configuration yield a byte-identical
/// dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// User demographics
    pub users: Vec<UserRecord>,
    /// Pre-period covariates, one row per user
    pub pre_metrics: Vec<PreMetricRecord>,
    /// Variant assignments, one row per user
    pub assignments: Vec<AssignmentRecord>,
    /// Behavioral event log
    pub events: Vec<EventRecord>,
    /// Verification attempts across both tiers
    pub verification_attempts: Vec<VerificationAttempt>,
}

impl Dataset {
    /// Observed assignment counts per variant, in stable (control, treatment) order
    pub fn assignment_counts(&self) -> [(Variant, u64); 2] {
        let mut control = 0u64;
        let mut treatment = 0u64;
        for assignment in &self.assignments {
            match assignment.variant {
                Variant::Control => control += 1,
                Variant::Treatment => treatment += 1,
            }
        }
        [(Variant::Control, control), (Variant::Treatment, treatment)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiments::DeviceType;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_assignment_counts() {
        let make = |variant| AssignmentRecord {
            user_id: Uuid::nil(),
            experiment_id: "verification_v1".to_string(),
            variant,
            assigned_at: Utc::now(),
            device_type: DeviceType::Ios,
            app_version: "2.6.0".to_string(),
        };

        let dataset = Dataset {
            users: vec![],
            pre_metrics: vec![],
            assignments: vec![
                make(Variant::Control),
                make(Variant::Treatment),
                make(Variant::Treatment),
            ],
            events: vec![],
            verification_attempts: vec![],
        };

        let [(_, control), (_, treatment)] = dataset.assignment_counts();
        assert_eq!(control, 1);
        assert_eq!(treatment, 2);
    }
}
