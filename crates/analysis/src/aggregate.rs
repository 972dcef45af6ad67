//! Metric aggregation over raw dataset rows
//!
//! Summaries are computed on demand from the event and attempt logs, never
//! stored. All reductions fold the input in the order given, so callers that
//! pass stably ordered rows get bit-identical summaries on every run.

use std::collections::HashMap;

use uuid::Uuid;

use crate::errors::{AnalysisError, Result};
use verilift_types::{
    AssignmentRecord, EventRecord, EventType, PreMetricRecord, Variant, VariantSummary,
    VerificationAttempt, VerificationTier,
};

/// Welford online accumulator for mean and sample variance
#[derive(Debug, Default, Clone)]
struct Welford {
    n: u64,
    sum: f64,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn push(&mut self, value: f64) {
        self.n += 1;
        self.sum += value;
        let delta = value - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn into_summary(self, variant: Variant, metric: &str) -> VariantSummary {
        let variance = if self.n >= 2 {
            Some(self.m2 / (self.n - 1) as f64)
        } else {
            None
        };
        VariantSummary {
            variant,
            metric: metric.to_string(),
            sample_size: self.n,
            sum: self.sum,
            mean: if self.n == 0 { 0.0 } else { self.mean },
            variance,
        }
    }
}

/// Metric name for a tier's completion rate
pub fn completion_metric_name(tier: VerificationTier) -> &'static str {
    match tier {
        VerificationTier::Tier1 => "tier1_completion_rate",
        VerificationTier::Tier2 => "tier2_completion_rate",
    }
}

/// Metric name for a tier's time-to-complete
pub fn time_metric_name(tier: VerificationTier) -> &'static str {
    match tier {
        VerificationTier::Tier1 => "time_to_complete_tier1",
        VerificationTier::Tier2 => "time_to_complete_tier2",
    }
}

/// Pure aggregation functions over dataset slices
pub struct MetricAggregator;

impl MetricAggregator {
    /// Completion counts per variant for one tier: (successes, attempts)
    ///
    /// The denominator is users who started the tier, matching how the
    /// baseline and lifted rates are defined.
    pub fn completion_counts(
        attempts: &[VerificationAttempt],
        tier: VerificationTier,
    ) -> [(Variant, u64, u64); 2] {
        Variant::ALL.map(|variant| {
            let mut successes = 0u64;
            let mut total = 0u64;
            for attempt in attempts {
                if attempt.variant == variant && attempt.tier == tier {
                    total += 1;
                    if attempt.is_completed() {
                        successes += 1;
                    }
                }
            }
            (variant, successes, total)
        })
    }

    /// Per-variant completion-rate summary rows for one tier
    ///
    /// A variant with zero attempts yields the zero-observation sentinel
    /// (`mean = 0.0`, `variance = None`) rather than NaN.
    pub fn summarize_completion(
        attempts: &[VerificationAttempt],
        tier: VerificationTier,
    ) -> [VariantSummary; 2] {
        let metric = completion_metric_name(tier);
        Self::completion_counts(attempts, tier).map(|(variant, successes, total)| {
            if total == 0 {
                return VariantSummary::empty(variant, metric);
            }
            let rate = successes as f64 / total as f64;
            // Bernoulli sample variance, ddof = 1
            let variance = if total >= 2 {
                Some(rate * (1.0 - rate) * total as f64 / (total - 1) as f64)
            } else {
                None
            };
            VariantSummary {
                variant,
                metric: metric.to_string(),
                sample_size: total,
                sum: successes as f64,
                mean: rate,
                variance,
            }
        })
    }

    /// Per-variant mean/variance summary of a continuous metric
    pub fn summarize_continuous(
        values: &[(Variant, f64)],
        metric: &str,
    ) -> [VariantSummary; 2] {
        let mut accumulators = [Welford::default(), Welford::default()];
        for (variant, value) in values {
            let slot = match variant {
                Variant::Control => 0,
                Variant::Treatment => 1,
            };
            accumulators[slot].push(*value);
        }
        let [control, treatment] = accumulators;
        [
            control.into_summary(Variant::Control, metric),
            treatment.into_summary(Variant::Treatment, metric),
        ]
    }

    /// Sessions per assigned user over the experiment window
    ///
    /// Every assigned user appears exactly once; users with no session
    /// events contribute a zero rather than vanishing from the denominator.
    pub fn sessions_per_user(
        events: &[EventRecord],
        assignments: &[AssignmentRecord],
    ) -> Vec<(Uuid, Variant, f64)> {
        let mut counts: HashMap<Uuid, u64> = HashMap::with_capacity(assignments.len());
        for event in events {
            if event.event_type == EventType::SessionStart {
                *counts.entry(event.user_id).or_insert(0) += 1;
            }
        }
        assignments
            .iter()
            .map(|assignment| {
                let count = counts.get(&assignment.user_id).copied().unwrap_or(0);
                (assignment.user_id, assignment.variant, count as f64)
            })
            .collect()
    }

    /// Minutes of session time per assigned user over the experiment window
    ///
    /// Sums the `duration_seconds` property off session-start events. As with
    /// `sessions_per_user`, assigned users with no sessions contribute a zero;
    /// events without the property contribute nothing.
    pub fn session_minutes_per_user(
        events: &[EventRecord],
        assignments: &[AssignmentRecord],
    ) -> Vec<(Uuid, Variant, f64)> {
        let mut seconds: HashMap<Uuid, f64> = HashMap::with_capacity(assignments.len());
        for event in events {
            if event.event_type != EventType::SessionStart {
                continue;
            }
            if let Some(duration) = event.property_f64("duration_seconds") {
                *seconds.entry(event.user_id).or_insert(0.0) += duration;
            }
        }
        assignments
            .iter()
            .map(|assignment| {
                let total = seconds.get(&assignment.user_id).copied().unwrap_or(0.0);
                (assignment.user_id, assignment.variant, total / 60.0)
            })
            .collect()
    }

    /// Seconds to complete, for completed attempts of one tier
    pub fn time_to_complete(
        attempts: &[VerificationAttempt],
        tier: VerificationTier,
    ) -> Vec<(Variant, f64)> {
        attempts
            .iter()
            .filter(|attempt| attempt.tier == tier && attempt.is_completed())
            .filter_map(|attempt| {
                attempt
                    .time_to_complete_secs
                    .map(|secs| (attempt.variant, secs as f64))
            })
            .collect()
    }

    /// Read a named pre-period covariate off a record
    pub fn covariate_value(record: &PreMetricRecord, covariate: &str) -> Option<f64> {
        match covariate {
            "pre_sessions" => Some(record.pre_sessions as f64),
            "pre_matches" => Some(record.pre_matches as f64),
            "pre_messages" => Some(record.pre_messages as f64),
            "pre_time_minutes" => Some(record.pre_time_minutes as f64),
            "pre_profile_views" => Some(record.pre_profile_views as f64),
            _ => None,
        }
    }

    /// Per-variant mean of a named pre-period covariate
    pub fn pre_covariate_means(
        pre_metrics: &[PreMetricRecord],
        assignments: &[AssignmentRecord],
        covariate: &str,
    ) -> Result<[VariantSummary; 2]> {
        let variant_of: HashMap<Uuid, Variant> = assignments
            .iter()
            .map(|assignment| (assignment.user_id, assignment.variant))
            .collect();

        let mut values = Vec::with_capacity(pre_metrics.len());
        for record in pre_metrics {
            let Some(variant) = variant_of.get(&record.user_id) else {
                continue;
            };
            let value = Self::covariate_value(record, covariate).ok_or_else(|| {
                AnalysisError::InvalidParameter(format!("unknown covariate {covariate}"))
            })?;
            values.push((*variant, value));
        }
        Ok(Self::summarize_continuous(&values, covariate))
    }

    /// Align post-period values with a pre-period covariate, user by user
    ///
    /// Returns (post, pre, variants) in the order of `values`. Users with no
    /// pre-period record are dropped from all three vectors so the CUPED
    /// inputs stay index-aligned.
    pub fn aligned_covariate(
        values: &[(Uuid, Variant, f64)],
        pre_metrics: &[PreMetricRecord],
        covariate: &str,
    ) -> Result<(Vec<f64>, Vec<f64>, Vec<Variant>)> {
        let pre_by_user: HashMap<Uuid, &PreMetricRecord> = pre_metrics
            .iter()
            .map(|record| (record.user_id, record))
            .collect();

        let mut post = Vec::with_capacity(values.len());
        let mut pre = Vec::with_capacity(values.len());
        let mut variants = Vec::with_capacity(values.len());
        for (user_id, variant, value) in values {
            let Some(record) = pre_by_user.get(user_id) else {
                continue;
            };
            let covariate_value = Self::covariate_value(record, covariate).ok_or_else(|| {
                AnalysisError::InvalidParameter(format!("unknown covariate {covariate}"))
            })?;
            post.push(*value);
            pre.push(covariate_value);
            variants.push(*variant);
        }
        Ok((post, pre, variants))
    }

    /// Split (variant, value) pairs into control and treatment samples
    pub fn split_by_variant(values: &[(Variant, f64)]) -> (Vec<f64>, Vec<f64>) {
        let mut control = Vec::new();
        let mut treatment = Vec::new();
        for (variant, value) in values {
            match variant {
                Variant::Control => control.push(*value),
                Variant::Treatment => treatment.push(*value),
            }
        }
        (control, treatment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use verilift_types::{CompletionStatus, DeviceType, FailureReason};

    fn attempt(
        user: u128,
        tier: VerificationTier,
        completed: bool,
        variant: Variant,
    ) -> VerificationAttempt {
        let attempted_at = Utc.with_ymd_and_hms(2024, 7, 3, 12, 0, 0).unwrap();
        VerificationAttempt {
            user_id: Uuid::from_u128(user),
            tier,
            attempted_at,
            status: if completed {
                CompletionStatus::Completed
            } else {
                CompletionStatus::Abandoned
            },
            completed_at: completed.then(|| attempted_at + chrono::Duration::seconds(240)),
            time_to_complete_secs: completed.then_some(240),
            failure_reason: (!completed).then_some(FailureReason::UserAbandoned),
            variant,
        }
    }

    fn assignment(user: u128, variant: Variant) -> AssignmentRecord {
        AssignmentRecord {
            user_id: Uuid::from_u128(user),
            experiment_id: "verification_v1".to_string(),
            variant,
            assigned_at: Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap(),
            device_type: DeviceType::Ios,
            app_version: "4.12.0".to_string(),
        }
    }

    #[test]
    fn test_completion_counts_by_tier_and_variant() {
        let attempts = vec![
            attempt(1, VerificationTier::Tier1, true, Variant::Control),
            attempt(2, VerificationTier::Tier1, false, Variant::Control),
            attempt(3, VerificationTier::Tier1, true, Variant::Treatment),
            attempt(4, VerificationTier::Tier2, true, Variant::Treatment),
        ];
        let [(_, c_succ, c_total), (_, t_succ, t_total)] =
            MetricAggregator::completion_counts(&attempts, VerificationTier::Tier1);
        assert_eq!((c_succ, c_total), (1, 2));
        assert_eq!((t_succ, t_total), (1, 1));
    }

    #[test]
    fn test_empty_variant_gets_sentinel_row() {
        let attempts = vec![attempt(1, VerificationTier::Tier1, true, Variant::Control)];
        let [control, treatment] =
            MetricAggregator::summarize_completion(&attempts, VerificationTier::Tier1);
        assert_eq!(control.sample_size, 1);
        assert_eq!(treatment.sample_size, 0);
        assert_eq!(treatment.mean, 0.0);
        assert!(treatment.variance.is_none());
        assert!(!treatment.is_sufficient());
    }

    #[test]
    fn test_continuous_summary_matches_direct_computation() {
        let values = vec![
            (Variant::Control, 2.0),
            (Variant::Control, 4.0),
            (Variant::Control, 6.0),
            (Variant::Treatment, 10.0),
        ];
        let [control, treatment] =
            MetricAggregator::summarize_continuous(&values, "sessions_count");
        assert_relative_eq!(control.mean, 4.0);
        assert_relative_eq!(control.variance.unwrap(), 4.0);
        assert_eq!(treatment.sample_size, 1);
        assert!(treatment.variance.is_none());
    }

    #[test]
    fn test_sessions_per_user_includes_inactive_users() {
        let assignments = vec![
            assignment(1, Variant::Control),
            assignment(2, Variant::Treatment),
        ];
        let events = vec![EventRecord {
            user_id: Uuid::from_u128(1),
            event_type: EventType::SessionStart,
            timestamp: Utc.with_ymd_and_hms(2024, 7, 2, 19, 30, 0).unwrap(),
            session_id: Uuid::from_u128(100),
            properties: serde_json::Map::new(),
            variant: Variant::Control,
        }];

        let per_user = MetricAggregator::sessions_per_user(&events, &assignments);
        assert_eq!(per_user.len(), 2);
        assert_relative_eq!(per_user[0].2, 1.0);
        assert_relative_eq!(per_user[1].2, 0.0);
    }

    #[test]
    fn test_session_minutes_sums_event_durations() {
        let assignments = vec![
            assignment(1, Variant::Control),
            assignment(2, Variant::Treatment),
        ];
        let session = |user: u128, session: u128, duration: Option<i64>| {
            let mut properties = serde_json::Map::new();
            if let Some(duration) = duration {
                properties.insert(
                    "duration_seconds".to_string(),
                    serde_json::Value::from(duration),
                );
            }
            EventRecord {
                user_id: Uuid::from_u128(user),
                event_type: EventType::SessionStart,
                timestamp: Utc.with_ymd_and_hms(2024, 7, 2, 19, 30, 0).unwrap(),
                session_id: Uuid::from_u128(session),
                properties,
                variant: Variant::Control,
            }
        };
        let events = vec![
            session(1, 100, Some(300)),
            session(1, 101, Some(120)),
            session(1, 102, None),
        ];

        let per_user = MetricAggregator::session_minutes_per_user(&events, &assignments);
        assert_eq!(per_user.len(), 2);
        assert_relative_eq!(per_user[0].2, 7.0);
        assert_relative_eq!(per_user[1].2, 0.0);
    }

    #[test]
    fn test_time_to_complete_skips_incomplete_attempts() {
        let attempts = vec![
            attempt(1, VerificationTier::Tier1, true, Variant::Control),
            attempt(2, VerificationTier::Tier1, false, Variant::Treatment),
        ];
        let times = MetricAggregator::time_to_complete(&attempts, VerificationTier::Tier1);
        assert_eq!(times.len(), 1);
        assert_relative_eq!(times[0].1, 240.0);
    }

    #[test]
    fn test_aligned_covariate_drops_users_without_pre_period() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let pre_metrics = vec![PreMetricRecord {
            user_id: Uuid::from_u128(1),
            period_start: now,
            period_end: now + chrono::Duration::days(30),
            pre_sessions: 12,
            pre_matches: 3,
            pre_messages: 20,
            pre_time_minutes: 95,
            pre_profile_views: 40,
        }];
        let values = vec![
            (Uuid::from_u128(1), Variant::Control, 14.0),
            (Uuid::from_u128(2), Variant::Treatment, 9.0),
        ];

        let (post, pre, variants) =
            MetricAggregator::aligned_covariate(&values, &pre_metrics, "pre_sessions").unwrap();
        assert_eq!(post, vec![14.0]);
        assert_eq!(pre, vec![12.0]);
        assert_eq!(variants, vec![Variant::Control]);
    }

    #[test]
    fn test_unknown_covariate_rejected() {
        let values = vec![(Uuid::from_u128(1), Variant::Control, 1.0)];
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let pre_metrics = vec![PreMetricRecord {
            user_id: Uuid::from_u128(1),
            period_start: now,
            period_end: now,
            pre_sessions: 0,
            pre_matches: 0,
            pre_messages: 0,
            pre_time_minutes: 0,
            pre_profile_views: 0,
        }];
        assert!(matches!(
            MetricAggregator::aligned_covariate(&values, &pre_metrics, "pre_swipes"),
            Err(AnalysisError::InvalidParameter(_))
        ));
    }
}
