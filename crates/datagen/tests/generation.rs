//! End-to-end generation and analysis round trips

use approx::assert_relative_eq;
use verilift_analysis::ExperimentAnalyzer;
use verilift_config::{ExperimentConfig, GenerationConfig, PlatformConfig};
use verilift_datagen::ExperimentDataGenerator;
use verilift_types::{Variant, VerificationTier};

fn scenario_config() -> (GenerationConfig, ExperimentConfig) {
    let mut generation = GenerationConfig::default();
    generation.user_count = 5_000;
    generation.random_seed = 42;
    generation.tier1_baseline_rate = 0.06;
    generation.tier1_lift = 0.15;
    (generation, ExperimentConfig::default())
}

#[test]
fn same_seed_reproduces_dataset_byte_for_byte() {
    let (mut generation, experiment) = scenario_config();
    generation.user_count = 1_000;

    let first = ExperimentDataGenerator::new(&generation, &experiment)
        .unwrap()
        .generate_all()
        .unwrap();
    let second = ExperimentDataGenerator::new(&generation, &experiment)
        .unwrap()
        .generate_all()
        .unwrap();

    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

#[test]
fn different_seed_changes_dataset() {
    let (mut generation, experiment) = scenario_config();
    generation.user_count = 500;

    let baseline = ExperimentDataGenerator::new(&generation, &experiment)
        .unwrap()
        .generate_all()
        .unwrap();
    generation.random_seed = 43;
    let reseeded = ExperimentDataGenerator::new(&generation, &experiment)
        .unwrap()
        .generate_all()
        .unwrap();

    assert_ne!(
        serde_json::to_vec(&baseline).unwrap(),
        serde_json::to_vec(&reseeded).unwrap()
    );
}

#[test]
fn generated_effect_is_recoverable() {
    let (generation, experiment) = scenario_config();
    let dataset = ExperimentDataGenerator::new(&generation, &experiment)
        .unwrap()
        .generate_all()
        .unwrap();

    // Tier-1 completion rates land near the configured baseline and lift
    let rate = |variant: Variant| {
        let tier1: Vec<_> = dataset
            .verification_attempts
            .iter()
            .filter(|a| a.variant == variant && a.tier == VerificationTier::Tier1)
            .collect();
        tier1.iter().filter(|a| a.is_completed()).count() as f64 / tier1.len() as f64
    };
    let control_rate = rate(Variant::Control);
    let treatment_rate = rate(Variant::Treatment);
    assert_relative_eq!(control_rate, generation.tier1_baseline_rate, epsilon = 0.02);
    assert!(
        treatment_rate > control_rate,
        "treatment {treatment_rate} vs control {control_rate}"
    );

    // The analyzer accepts the dataset: no sample ratio mismatch
    let mut platform = PlatformConfig::default();
    platform.generation = generation;
    platform.experiment = experiment;
    let report = ExperimentAnalyzer::new(&platform).analyze(&dataset).unwrap();
    assert!(report.srm.p_value > 0.01, "srm p {}", report.srm.p_value);
    assert!(!report.srm_mismatch);
    assert!(report.result_for("tier1_completion_rate").is_some());
}
