//! Churn Trainer - deterministic GBDT training for the Telco churn model
//!
//! Provides the fixed-point dataset, seeded stratified split, CART builder
//! and logistic boosting loop, plus the end-to-end pipeline that validates,
//! encodes, trains, evaluates and records a run, and a cross-validated grid
//! search over tree count and depth.

pub mod cart;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod pipeline;
pub mod trainer;
pub mod tune;

pub use dataset::Dataset;
pub use deterministic::{LcgRng, SplitTieBreaker};
pub use errors::TrainerError;
pub use pipeline::{run_pipeline, PipelineOutcome};
pub use trainer::{GbdtConfig, GbdtTrainer};
pub use tune::{run_tuning, GridSearch, TrialResult, TuningOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
