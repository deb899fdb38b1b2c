//! Churn Core: feature encoding, validation and inference for the Telco
//! churn model
//!
//! The central guarantee is train/serve parity: a [`FeatureSpec`] inferred
//! once from the training frame drives both the batch encoder and the
//! single-record encoder, and the persisted [`FeatureSchema`] fixes the width
//! and order of every vector the model sees.
//!
//! Modules:
//! - `frame`: Raw customer records, frames and CSV loading
//! - `preprocess`: Identifier removal and numeric coercion
//! - `validation`: Data-quality rule battery
//! - `schema`: Feature specification and persisted column schema
//! - `encoder`: Training and serving encoders
//! - `gbdt`: Integer-only boosted tree classifier
//! - `metrics`: Classification metrics
//! - `tracking`: File-backed experiment runs
//! - `serving`: Immutable prediction context
//! - `config`: Layered pipeline configuration

pub mod config;
pub mod encoder;
pub mod errors;
pub mod frame;
pub mod gbdt;
pub mod metrics;
pub mod preprocess;
pub mod schema;
pub mod serde_canon;
pub mod serving;
pub mod tracking;
pub mod validation;

pub use config::{DataConfig, PipelineConfig, TrainingConfig, TuningConfig, MAX_TREE_DEPTH};
pub use encoder::{encode_frame, encode_record, encode_training, EncodedFrame, TrainingEncoding};
pub use errors::{ChurnError, Result};
pub use frame::{Column, ColumnType, RawFrame, RawRecord, Value};
pub use gbdt::{Model, ModelError, Node, Tree, SCALE};
pub use metrics::{evaluate, roc_auc, ClassificationMetrics, ConfusionMatrix};
pub use preprocess::preprocess;
pub use schema::{binary_mapping, ColumnEncoding, ColumnSpec, FeatureSchema, FeatureSpec};
pub use serving::{Prediction, ServingContext, LIKELY_TO_CHURN, NOT_LIKELY_TO_CHURN};
pub use tracking::{FileTracker, RunHandle, RunMeta, RunStatus};
pub use validation::{DataValidator, Rule, ValidationReport};

/// Crate version string recorded with each training run
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
