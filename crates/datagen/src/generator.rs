//! Deterministic synthetic dataset generation
//!
//! Every record derives from a per-user child RNG seeded by
//! (root seed, stream, user index), so generation is reproducible
//! record-for-record and no draw for one user can perturb another's.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand_distr::{Beta, Exp, Gamma, LogNormal, Poisson};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::assignment::VariantAssigner;
use crate::errors::{GenerationError, Result};
use crate::quality::DataQualityReport;
use verilift_config::{ExperimentConfig, GenerationConfig};
use verilift_types::{
    AccountType, AssignmentRecord, CompletionStatus, Dataset, DeviceType, Education, EventRecord,
    EventType, FailureReason, Gender, PreMetricRecord, UserRecord, Variant, VerificationAttempt,
    VerificationTier,
};

// Independent draw streams; one per generation phase so adding draws to one
// phase never shifts another phase's output
const STREAM_USERS: u64 = 1;
const STREAM_PRE_METRICS: u64 = 2;
const STREAM_ASSIGNMENTS: u64 = 3;
const STREAM_EVENTS: u64 = 4;
const STREAM_VERIFICATION: u64 = 5;

const APP_VERSIONS: [(&str, f64); 3] = [("4.12.0", 0.6), ("4.11.2", 0.3), ("4.10.5", 0.1)];
const IOS_SHARE: f64 = 0.55;
const PRE_PERIOD_DAYS: i64 = 30;

/// splitmix64 finalizer over (seed, stream, index)
fn child_seed(seed: u64, stream: u64, index: u64) -> u64 {
    let mut z = seed
        ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ index.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn child_rng(seed: u64, stream: u64, index: u64) -> StdRng {
    StdRng::seed_from_u64(child_seed(seed, stream, index))
}

/// A v4-shaped UUID drawn from the deterministic stream
fn deterministic_uuid(rng: &mut StdRng) -> Uuid {
    uuid::Builder::from_random_bytes(rng.gen()).into_uuid()
}

fn distribution_err(what: &str, err: impl std::fmt::Display) -> GenerationError {
    GenerationError::Distribution(format!("{what}: {err}"))
}

/// Generates the full synthetic dataset for one experiment
#[derive(Debug, Clone)]
pub struct ExperimentDataGenerator {
    generation: GenerationConfig,
    experiment: ExperimentConfig,
}

impl ExperimentDataGenerator {
    pub fn new(generation: &GenerationConfig, experiment: &ExperimentConfig) -> Result<Self> {
        generation.validate()?;
        experiment.validate()?;

        // Generation-specific checks the config layer does not own
        if generation.locations.iter().any(|(_, w)| *w <= 0.0) {
            return Err(GenerationError::Validation(
                "location weights must be positive".to_string(),
            ));
        }
        if generation.signup_recency_days <= 0.0 {
            return Err(GenerationError::Validation(
                "signup_recency_days must be positive".to_string(),
            ));
        }

        Ok(Self {
            generation: generation.clone(),
            experiment: experiment.clone(),
        })
    }

    fn start_datetime(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.experiment.start_date.and_time(NaiveTime::MIN))
    }

    /// Demographic rows, one per user
    pub fn generate_users(&self) -> Result<Vec<UserRecord>> {
        let cfg = &self.generation;
        let start = self.start_datetime();

        // Skews young, matching the observed age curve of the product
        let age_curve = Beta::new(2.0, 3.0).map_err(|e| distribution_err("age beta", e))?;
        let signup_gap = Exp::new(1.0 / cfg.signup_recency_days)
            .map_err(|e| distribution_err("signup exponential", e))?;
        let gender_weights = WeightedIndex::new(cfg.gender_weights)
            .map_err(|e| distribution_err("gender weights", e))?;
        let education_weights = WeightedIndex::new(cfg.education_weights)
            .map_err(|e| distribution_err("education weights", e))?;
        let engagement_weights = WeightedIndex::new(cfg.engagement_weights)
            .map_err(|e| distribution_err("engagement weights", e))?;
        let location_weights = WeightedIndex::new(cfg.locations.iter().map(|(_, w)| *w))
            .map_err(|e| distribution_err("location weights", e))?;

        const GENDERS: [Gender; 3] = [Gender::Male, Gender::Female, Gender::NonBinary];
        const EDUCATIONS: [Education; 4] = [
            Education::Bachelors,
            Education::Masters,
            Education::Phd,
            Education::Other,
        ];
        const TIERS: [verilift_types::EngagementTier; 4] = [
            verilift_types::EngagementTier::Power,
            verilift_types::EngagementTier::Regular,
            verilift_types::EngagementTier::Casual,
            verilift_types::EngagementTier::Churned,
        ];

        let (age_lo, age_hi) = cfg.age_range;
        let span = (age_hi - age_lo) as f64;

        let mut users = Vec::with_capacity(cfg.user_count);
        for index in 0..cfg.user_count {
            let mut rng = child_rng(cfg.random_seed, STREAM_USERS, index as u64);

            let user_id = deterministic_uuid(&mut rng);
            let age_draw: f64 = rng.sample(age_curve);
            let age = (age_lo as f64 + age_draw * span).round() as u8;
            let days_before_start: f64 = rng.sample(signup_gap);
            let signup_date = start - Duration::seconds((days_before_start * 86_400.0) as i64);

            users.push(UserRecord {
                user_id,
                signup_date,
                age,
                gender: GENDERS[gender_weights.sample(&mut rng)],
                location: cfg.locations[location_weights.sample(&mut rng)].0.clone(),
                education: EDUCATIONS[education_weights.sample(&mut rng)],
                account_type: if rng.gen_bool(cfg.premium_rate) {
                    AccountType::Premium
                } else {
                    AccountType::Free
                },
                engagement_tier: TIERS[engagement_weights.sample(&mut rng)],
            });
        }
        debug!(count = users.len(), "users generated");
        Ok(users)
    }

    /// Pre-experiment behavioral counters, one row per user
    ///
    /// Pre-period sessions correlate with post-period sessions through the
    /// shared engagement tier, which is exactly the correlation the CUPED
    /// covariate relies on.
    pub fn generate_pre_metrics(&self, users: &[UserRecord]) -> Result<Vec<PreMetricRecord>> {
        let cfg = &self.generation;
        let start = self.start_datetime();
        let period_start = start - Duration::days(PRE_PERIOD_DAYS);

        let session_gamma = Gamma::new(cfg.pre_sessions_shape, cfg.pre_sessions_scale)
            .map_err(|e| distribution_err("pre-session gamma", e))?;
        let time_curve =
            LogNormal::new(3.0, 0.75).map_err(|e| distribution_err("time lognormal", e))?;

        let mut rows = Vec::with_capacity(users.len());
        for (index, user) in users.iter().enumerate() {
            let mut rng = child_rng(cfg.random_seed, STREAM_PRE_METRICS, index as u64);
            let multiplier = user.engagement_tier.activity_multiplier();

            let sessions_f: f64 = rng.sample(session_gamma) * multiplier;
            let pre_sessions = sessions_f.round() as u32;

            // Negative-binomial style: gamma-mixed Poisson keeps matches
            // overdispersed but correlated with session volume
            let match_shape = (sessions_f * 0.7).max(1.0);
            let match_rate: f64 = rng.sample(
                Gamma::new(match_shape, 1.0).map_err(|e| distribution_err("match gamma", e))?,
            );
            let pre_matches = sample_poisson(&mut rng, match_rate)?;
            let pre_messages = sample_poisson(&mut rng, sessions_f * 1.2)?;
            let time_f: f64 = rng.sample(time_curve) * multiplier;
            let pre_profile_views = sample_poisson(&mut rng, sessions_f * 8.0)?;

            rows.push(PreMetricRecord {
                user_id: user.user_id,
                period_start,
                period_end: start,
                pre_sessions,
                pre_matches,
                pre_messages,
                pre_time_minutes: time_f.round() as u32,
                pre_profile_views,
            });
        }
        debug!(count = rows.len(), "pre-period metrics generated");
        Ok(rows)
    }

    /// Variant assignments, one per user, via the stable hash
    pub fn generate_assignments(&self, users: &[UserRecord]) -> Result<Vec<AssignmentRecord>> {
        let cfg = &self.generation;
        let start = self.start_datetime();
        let version_weights = WeightedIndex::new(APP_VERSIONS.iter().map(|(_, w)| *w))
            .map_err(|e| distribution_err("app version weights", e))?;

        let mut assignments = Vec::with_capacity(users.len());
        for (index, user) in users.iter().enumerate() {
            let mut rng = child_rng(cfg.random_seed, STREAM_ASSIGNMENTS, index as u64);
            let variant = VariantAssigner::assign(
                &user.user_id.to_string(),
                &self.experiment.experiment_id,
                self.experiment.traffic_split,
            )?;

            assignments.push(AssignmentRecord {
                user_id: user.user_id,
                experiment_id: self.experiment.experiment_id.clone(),
                variant,
                assigned_at: start,
                device_type: if rng.gen_bool(IOS_SHARE) {
                    DeviceType::Ios
                } else {
                    DeviceType::Android
                },
                app_version: APP_VERSIONS[version_weights.sample(&mut rng)].0.to_string(),
            });
        }
        debug!(count = assignments.len(), "assignments generated");
        Ok(assignments)
    }

    /// Session activity events over the experiment window
    pub fn generate_events(
        &self,
        users: &[UserRecord],
        assignments: &[AssignmentRecord],
    ) -> Result<Vec<EventRecord>> {
        let cfg = &self.generation;
        let start = self.start_datetime();
        let duration = self.experiment.duration_days;
        let variant_of = variant_map(assignments);

        // Day-of-week weights over the window; weekends run hotter
        let day_weights: Vec<f64> = (0..duration)
            .map(|offset| {
                let date = self.experiment.start_date + Duration::days(offset as i64);
                match date.weekday() {
                    Weekday::Sat | Weekday::Sun => cfg.weekend_multiplier,
                    _ => 1.0,
                }
            })
            .collect();
        let day_picker =
            WeightedIndex::new(&day_weights).map_err(|e| distribution_err("day weights", e))?;
        let session_length =
            LogNormal::new(5.5, 0.8).map_err(|e| distribution_err("session length", e))?;

        let mut events = Vec::new();
        for (index, user) in users.iter().enumerate() {
            let Some(variant) = variant_of.get(&user.user_id).copied() else {
                continue;
            };
            let mut rng = child_rng(cfg.random_seed, STREAM_EVENTS, index as u64);

            let lift_factor = match variant {
                Variant::Treatment => 1.0 + cfg.engagement_lift,
                Variant::Control => 1.0,
            };
            let session_rate =
                duration as f64 * user.engagement_tier.activity_multiplier() * lift_factor;
            let n_sessions = sample_poisson(&mut rng, session_rate)?;

            for _ in 0..n_sessions {
                let day = day_picker.sample(&mut rng) as i64;
                let hour: u32 = if rng.gen_bool(cfg.evening_peak_share) {
                    rng.gen_range(18..22)
                } else {
                    rng.gen_range(0..24)
                };
                let timestamp = start
                    + Duration::days(day)
                    + Duration::hours(hour as i64)
                    + Duration::seconds(rng.gen_range(0..3600));
                let session_id = deterministic_uuid(&mut rng);

                let mut properties = Map::new();
                let duration_secs: f64 = rng.sample(session_length);
                properties.insert(
                    "duration_seconds".to_string(),
                    Value::from(duration_secs.round() as u64),
                );
                events.push(EventRecord {
                    user_id: user.user_id,
                    event_type: EventType::SessionStart,
                    timestamp,
                    session_id,
                    properties,
                    variant,
                });

                let n_views = sample_poisson(&mut rng, 4.0)?;
                for _ in 0..n_views {
                    events.push(EventRecord {
                        user_id: user.user_id,
                        event_type: EventType::ProfileView,
                        timestamp: timestamp + Duration::seconds(rng.gen_range(1..1800)),
                        session_id,
                        properties: Map::new(),
                        variant,
                    });
                }
                if rng.gen_bool(0.15) {
                    let match_at = timestamp + Duration::seconds(rng.gen_range(1..1800));
                    events.push(EventRecord {
                        user_id: user.user_id,
                        event_type: EventType::Match,
                        timestamp: match_at,
                        session_id,
                        properties: Map::new(),
                        variant,
                    });
                    let n_messages = sample_poisson(&mut rng, 2.0)?;
                    for _ in 0..n_messages {
                        events.push(EventRecord {
                            user_id: user.user_id,
                            event_type: EventType::MessageSent,
                            timestamp: match_at + Duration::seconds(rng.gen_range(1..900)),
                            session_id,
                            properties: Map::new(),
                            variant,
                        });
                    }
                }
            }
        }
        debug!(count = events.len(), "activity events generated");
        Ok(events)
    }

    /// Verification funnel: attempts plus their started/completed events
    ///
    /// The configured lifts injected here are the ground-truth treatment
    /// effect the analysis side is expected to recover.
    pub fn generate_verification_flow(
        &self,
        users: &[UserRecord],
        assignments: &[AssignmentRecord],
    ) -> Result<(Vec<VerificationAttempt>, Vec<EventRecord>)> {
        let cfg = &self.generation;
        let start = self.start_datetime();
        let window_secs = self.experiment.duration_days as i64 * 86_400;
        let variant_of = variant_map(assignments);

        // Minutes-scale completion times, heavier tail for tier 2
        let tier1_time =
            LogNormal::new(5.0, 0.6).map_err(|e| distribution_err("tier1 time", e))?;
        let tier2_time =
            LogNormal::new(6.2, 0.7).map_err(|e| distribution_err("tier2 time", e))?;

        let mut attempts = Vec::new();
        let mut events = Vec::new();
        for (index, user) in users.iter().enumerate() {
            let Some(variant) = variant_of.get(&user.user_id).copied() else {
                continue;
            };
            let mut rng = child_rng(cfg.random_seed, STREAM_VERIFICATION, index as u64);

            if !rng.gen_bool(cfg.tier1_start_rate) {
                continue;
            }
            let attempted_at = start + Duration::seconds(rng.gen_range(0..window_secs));
            let tier1 = self.attempt(
                &mut rng,
                &mut events,
                user.user_id,
                variant,
                VerificationTier::Tier1,
                attempted_at,
                lifted_rate(cfg.tier1_baseline_rate, cfg.tier1_lift, variant),
                &tier1_time,
                0.7,
            )?;
            let tier1_completed_at = tier1.completed_at;
            attempts.push(tier1);

            if let Some(completed_at) = tier1_completed_at {
                if rng.gen_bool(cfg.tier2_start_rate) {
                    let tier2_at = completed_at + Duration::seconds(rng.gen_range(60..86_400));
                    let tier2 = self.attempt(
                        &mut rng,
                        &mut events,
                        user.user_id,
                        variant,
                        VerificationTier::Tier2,
                        tier2_at,
                        lifted_rate(cfg.tier2_baseline_rate, cfg.tier2_lift, variant),
                        &tier2_time,
                        0.6,
                    )?;
                    attempts.push(tier2);
                }
            }
        }
        debug!(count = attempts.len(), "verification attempts generated");
        Ok((attempts, events))
    }

    #[allow(clippy::too_many_arguments)]
    fn attempt(
        &self,
        rng: &mut StdRng,
        events: &mut Vec<EventRecord>,
        user_id: Uuid,
        variant: Variant,
        tier: VerificationTier,
        attempted_at: DateTime<Utc>,
        completion_rate: f64,
        time_curve: &LogNormal<f64>,
        abandon_share: f64,
    ) -> Result<VerificationAttempt> {
        let session_id = deterministic_uuid(rng);
        let mut properties = Map::new();
        properties.insert("tier".to_string(), Value::from(tier.to_string()));
        events.push(EventRecord {
            user_id,
            event_type: EventType::VerificationStarted,
            timestamp: attempted_at,
            session_id,
            properties: properties.clone(),
            variant,
        });

        if rng.gen_bool(completion_rate) {
            let secs: f64 = time_curve.sample(rng);
            let time_to_complete_secs = secs.round().max(1.0) as u32;
            let completed_at = attempted_at + Duration::seconds(time_to_complete_secs as i64);
            events.push(EventRecord {
                user_id,
                event_type: EventType::VerificationCompleted,
                timestamp: completed_at,
                session_id,
                properties,
                variant,
            });
            Ok(VerificationAttempt {
                user_id,
                tier,
                attempted_at,
                status: CompletionStatus::Completed,
                completed_at: Some(completed_at),
                time_to_complete_secs: Some(time_to_complete_secs),
                failure_reason: None,
                variant,
            })
        } else {
            let (status, failure_reason) = if rng.gen_bool(abandon_share) {
                (CompletionStatus::Abandoned, FailureReason::UserAbandoned)
            } else {
                (CompletionStatus::Failed, FailureReason::VerificationFailed)
            };
            Ok(VerificationAttempt {
                user_id,
                tier,
                attempted_at,
                status,
                completed_at: None,
                time_to_complete_secs: None,
                failure_reason: Some(failure_reason),
                variant,
            })
        }
    }

    /// Generate the full dataset and run the quality report over it
    pub fn generate_all(&self) -> Result<Dataset> {
        info!(
            users = self.generation.user_count,
            seed = self.generation.random_seed,
            experiment_id = %self.experiment.experiment_id,
            "generating dataset"
        );

        let users = self.generate_users()?;
        let pre_metrics = self.generate_pre_metrics(&users)?;
        let assignments = self.generate_assignments(&users)?;
        let mut events = self.generate_events(&users, &assignments)?;
        let (verification_attempts, verification_events) =
            self.generate_verification_flow(&users, &assignments)?;
        events.extend(verification_events);
        // Stable sort keeps same-timestamp events in generation order
        events.sort_by_key(|event| event.timestamp);

        let dataset = Dataset {
            users,
            pre_metrics,
            assignments,
            events,
            verification_attempts,
        };

        let report = DataQualityReport::build(&dataset, &self.generation, &self.experiment)?;
        report.log();
        Ok(dataset)
    }
}

fn lifted_rate(baseline: f64, lift: f64, variant: Variant) -> f64 {
    match variant {
        Variant::Control => baseline,
        Variant::Treatment => baseline * (1.0 + lift),
    }
}

fn variant_map(assignments: &[AssignmentRecord]) -> HashMap<Uuid, Variant> {
    assignments
        .iter()
        .map(|assignment| (assignment.user_id, assignment.variant))
        .collect()
}

fn sample_poisson(rng: &mut StdRng, rate: f64) -> Result<u32> {
    if rate <= 0.0 {
        return Ok(0);
    }
    let poisson = Poisson::new(rate).map_err(|e| distribution_err("poisson", e))?;
    let draw: f64 = rng.sample(poisson);
    Ok(draw as u32)
}
