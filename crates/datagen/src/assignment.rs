//! Hash-based variant assignment
//!
//! Assignment is a pure function of (user, experiment): hashing the pair
//! into a fixed bucket space means any service can recompute a user's
//! variant without coordination, and re-running assignment can never
//! reshuffle users between arms.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::errors::{GenerationError, Result};
use verilift_types::Variant;

/// Size of the assignment bucket space
pub const BUCKET_COUNT: u64 = 10_000;

/// Stateless deterministic variant assigner
pub struct VariantAssigner;

impl VariantAssigner {
    /// Assign a user to a variant
    ///
    /// SHA-256 of `"{user_id}:{experiment_id}"`, first 8 digest bytes as a
    /// big-endian integer, reduced to a bucket in `[0, 10_000)`. Control
    /// gets the low buckets, so `split` is the expected control fraction.
    pub fn assign(user_id: &str, experiment_id: &str, split: f64) -> Result<Variant> {
        if user_id.is_empty() {
            return Err(GenerationError::Validation(
                "user_id must not be empty".to_string(),
            ));
        }
        if experiment_id.is_empty() {
            return Err(GenerationError::Validation(
                "experiment_id must not be empty".to_string(),
            ));
        }
        if split <= 0.0 || split >= 1.0 {
            return Err(GenerationError::Validation(format!(
                "traffic split must be in (0, 1), got {split}"
            )));
        }

        let digest = Sha256::digest(format!("{user_id}:{experiment_id}").as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let bucket = u64::from_be_bytes(prefix) % BUCKET_COUNT;

        let variant = if (bucket as f64) < split * BUCKET_COUNT as f64 {
            Variant::Control
        } else {
            Variant::Treatment
        };
        Ok(variant)
    }

    /// Re-derive the assignment and compare against a recorded variant
    pub fn check_consistency(
        user_id: &str,
        experiment_id: &str,
        expected: Variant,
        split: f64,
    ) -> Result<bool> {
        let actual = Self::assign(user_id, experiment_id, split)?;
        if actual != expected {
            debug!(
                user_id,
                experiment_id,
                ?expected,
                ?actual,
                "recorded variant does not match hash"
            );
        }
        Ok(actual == expected)
    }
}

/// Observed allocation over a set of user ids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentDistribution {
    pub n_control: u64,
    pub n_treatment: u64,
    /// Observed control fraction
    pub control_ratio: f64,
    /// Absolute deviation from the expected control fraction
    pub deviation: f64,
    /// Whether the deviation is within tolerance
    pub balanced: bool,
}

/// Assign every id and compare the realized split against expectations
pub fn validate_assignment_distribution<'a, I>(
    user_ids: I,
    experiment_id: &str,
    expected_control_ratio: f64,
    tolerance: f64,
) -> Result<AssignmentDistribution>
where
    I: IntoIterator<Item = &'a str>,
{
    if tolerance <= 0.0 {
        return Err(GenerationError::Validation(format!(
            "tolerance must be positive, got {tolerance}"
        )));
    }

    let mut n_control = 0u64;
    let mut n_treatment = 0u64;
    for user_id in user_ids {
        match VariantAssigner::assign(user_id, experiment_id, expected_control_ratio)? {
            Variant::Control => n_control += 1,
            Variant::Treatment => n_treatment += 1,
        }
    }

    let total = n_control + n_treatment;
    if total == 0 {
        return Err(GenerationError::Validation(
            "no user ids to validate".to_string(),
        ));
    }

    let control_ratio = n_control as f64 / total as f64;
    let deviation = (control_ratio - expected_control_ratio).abs();
    Ok(AssignmentDistribution {
        n_control,
        n_treatment,
        control_ratio,
        deviation,
        balanced: deviation <= tolerance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_is_idempotent() {
        let first = VariantAssigner::assign("user_417", "verification_v1", 0.5).unwrap();
        for _ in 0..10 {
            let again = VariantAssigner::assign("user_417", "verification_v1", 0.5).unwrap();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_different_experiments_reshuffle_users() {
        // With 200 users the odds of two independent hashes agreeing on
        // every single one are negligible
        let ids: Vec<String> = (0..200).map(|i| format!("user_{i}")).collect();
        let any_differ = ids.iter().any(|id| {
            VariantAssigner::assign(id, "verification_v1", 0.5).unwrap()
                != VariantAssigner::assign(id, "verification_v2", 0.5).unwrap()
        });
        assert!(any_differ);
    }

    #[test]
    fn test_split_is_approximately_uniform() {
        let ids: Vec<String> = (0..10_000).map(|i| format!("user_{i}")).collect();
        let distribution = validate_assignment_distribution(
            ids.iter().map(String::as_str),
            "verification_v1",
            0.5,
            0.02,
        )
        .unwrap();
        assert!(distribution.balanced, "deviation {}", distribution.deviation);
        assert!(distribution.n_control > 0 && distribution.n_treatment > 0);
    }

    #[test]
    fn test_skewed_split_respected() {
        let ids: Vec<String> = (0..10_000).map(|i| format!("user_{i}")).collect();
        let distribution = validate_assignment_distribution(
            ids.iter().map(String::as_str),
            "verification_v1",
            0.9,
            0.02,
        )
        .unwrap();
        assert!(distribution.balanced, "deviation {}", distribution.deviation);
        assert!(distribution.n_control > distribution.n_treatment * 5);
    }

    #[test]
    fn test_consistency_check_round_trips() {
        let variant = VariantAssigner::assign("user_9", "verification_v1", 0.5).unwrap();
        assert!(
            VariantAssigner::check_consistency("user_9", "verification_v1", variant, 0.5).unwrap()
        );
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert!(VariantAssigner::assign("", "verification_v1", 0.5).is_err());
        assert!(VariantAssigner::assign("user_1", "", 0.5).is_err());
        assert!(VariantAssigner::assign("user_1", "verification_v1", 0.0).is_err());
        assert!(VariantAssigner::assign("user_1", "verification_v1", 1.0).is_err());
    }
}
