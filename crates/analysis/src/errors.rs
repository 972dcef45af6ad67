//! Error types for the analysis suite

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Degenerate covariate: {0}")]
    DegenerateCovariate(String),

    #[error("Statistical error: {0}")]
    Statistical(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
