//! Error types for data generation

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenerationError>;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] verilift_config::ConfigError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Distribution error: {0}")]
    Distribution(String),

    #[error("Analysis error: {0}")]
    Analysis(#[from] verilift_analysis::AnalysisError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
