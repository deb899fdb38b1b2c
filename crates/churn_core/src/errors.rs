//! Error types for the churn core crate

use crate::gbdt::ModelError;
use thiserror::Error;

/// Errors raised while loading, validating, encoding or serving churn data
#[derive(Error, Debug)]
pub enum ChurnError {
    /// Target column absent, or a required raw field missing at serving time
    #[error("Schema error: {0}")]
    Schema(String),

    /// The data-quality battery reported failing rules
    #[error("Data quality check failed: {}", failed_rules.join(", "))]
    DataQuality { failed_rules: Vec<String> },

    /// Persisted model, feature specification and schema disagree
    #[error("Encoding drift: {0}")]
    EncodingDrift(String),

    /// A numeric field was present but could not be parsed
    #[error("Unparseable numeric value {value:?} for field '{field}'")]
    UnparseableNumeric { field: String, value: String },

    /// Model artifact error
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Tracking store error
    #[error("Tracking error: {0}")]
    Tracking(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for churn core operations
pub type Result<T> = std::result::Result<T, ChurnError>;
