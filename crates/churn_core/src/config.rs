//! Pipeline configuration
//!
//! Configuration is layered: compiled-in defaults, then an optional TOML
//! file, then `CHURN_*` environment variables, then CLI flags (applied by the
//! binary). [`PipelineConfig::validate`] rejects impossible values and returns
//! warnings for suspicious ones.

use crate::errors::{ChurnError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Deepest tree the trainer will grow
pub const MAX_TREE_DEPTH: usize = 32;

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub training: TrainingConfig,
    pub tuning: TuningConfig,
    pub tracking: TrackingConfig,
    pub serving: ServingConfig,
    pub logging: LoggingConfig,
}

/// Input data layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    /// Label column
    pub target: String,
    /// Identifier column, dropped before encoding
    pub id_column: String,
    /// Columns coerced to numbers during preprocessing
    pub numeric_columns: Vec<String>,
}

/// Split and booster hyper-parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    /// Decision threshold on the positive-class probability
    pub threshold: f64,
    /// Fraction of each class held out for evaluation
    pub test_size: f64,
    pub seed: u64,
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Minimum hessian sum per child
    pub min_child_weight: f64,
    /// L2 regularisation on leaf values
    pub lambda: f64,
    /// Row fraction sampled per tree
    pub subsample: f64,
    /// Feature fraction sampled per tree
    pub colsample_bytree: f64,
    /// Threshold quantization step, in fixed-point units
    pub quant_step: i64,
}

/// Grid searched by `churn tune`. Every other booster setting comes from
/// [`TrainingConfig`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TuningConfig {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<usize>,
    /// Cross-validation folds per candidate
    pub folds: usize,
    /// Decision threshold used when scoring fold accuracy
    pub threshold: f64,
}

/// Run tracking store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackingConfig {
    pub root: PathBuf,
    pub experiment: String,
}

/// Prediction-time settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServingConfig {
    /// Raw fields a prediction request must carry
    pub required_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub level: String,
}

fn default_numeric_columns() -> Vec<String> {
    ["tenure", "MonthlyCharges", "TotalCharges"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            target: "Churn".to_string(),
            id_column: "customerID".to_string(),
            numeric_columns: default_numeric_columns(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.35,
            test_size: 0.2,
            seed: 42,
            n_estimators: 301,
            learning_rate: 0.034,
            max_depth: 7,
            min_samples_leaf: 1,
            min_child_weight: 1.0,
            lambda: 1.0,
            subsample: 0.95,
            colsample_bytree: 0.98,
            quant_step: 1,
        }
    }
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            n_estimators: vec![50, 100, 200],
            max_depth: vec![2, 5, 10, 20],
            folds: 3,
            threshold: 0.5,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("mlruns"),
            experiment: "Telco Churn".to_string(),
        }
    }
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            required_fields: default_numeric_columns(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file; absent sections and keys keep their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ChurnError::Config(format!("Failed to parse config: {e}")))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ChurnError::Config(format!("Failed to serialize config: {e}")))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_toml_string()?)?;
        info!("Configuration saved to: {}", path.as_ref().display());
        Ok(())
    }

    /// Apply `CHURN_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Values that do not parse
    /// are a configuration error rather than silently ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: String) -> Result<T> {
            raw.trim()
                .parse()
                .map_err(|_| ChurnError::Config(format!("Invalid value {raw:?} for {key}")))
        }

        if let Some(v) = lookup("CHURN_TARGET") {
            self.data.target = v;
        }
        if let Some(v) = lookup("CHURN_THRESHOLD") {
            self.training.threshold = parsed("CHURN_THRESHOLD", v)?;
        }
        if let Some(v) = lookup("CHURN_TEST_SIZE") {
            self.training.test_size = parsed("CHURN_TEST_SIZE", v)?;
        }
        if let Some(v) = lookup("CHURN_SEED") {
            self.training.seed = parsed("CHURN_SEED", v)?;
        }
        if let Some(v) = lookup("CHURN_N_ESTIMATORS") {
            self.training.n_estimators = parsed("CHURN_N_ESTIMATORS", v)?;
        }
        if let Some(v) = lookup("CHURN_MAX_DEPTH") {
            self.training.max_depth = parsed("CHURN_MAX_DEPTH", v)?;
        }
        if let Some(v) = lookup("CHURN_TRACKING_DIR") {
            self.tracking.root = PathBuf::from(v);
        }
        if let Some(v) = lookup("CHURN_EXPERIMENT") {
            self.tracking.experiment = v;
        }
        if let Some(v) = lookup("CHURN_LOG_LEVEL") {
            self.logging.level = v;
        }
        Ok(())
    }

    /// Reject impossible values; return warnings for questionable ones
    pub fn validate(&self) -> Result<Vec<String>> {
        let t = &self.training;
        let open_unit = |x: f64| x > 0.0 && x < 1.0;

        if !open_unit(t.threshold) {
            return Err(ChurnError::Config(format!(
                "threshold must be in (0, 1), got {}",
                t.threshold
            )));
        }
        if !open_unit(t.test_size) {
            return Err(ChurnError::Config(format!(
                "test_size must be in (0, 1), got {}",
                t.test_size
            )));
        }
        if !(t.subsample > 0.0 && t.subsample <= 1.0) {
            return Err(ChurnError::Config(format!(
                "subsample must be in (0, 1], got {}",
                t.subsample
            )));
        }
        if !(t.colsample_bytree > 0.0 && t.colsample_bytree <= 1.0) {
            return Err(ChurnError::Config(format!(
                "colsample_bytree must be in (0, 1], got {}",
                t.colsample_bytree
            )));
        }
        if t.learning_rate <= 0.0 {
            return Err(ChurnError::Config("learning_rate must be positive".into()));
        }
        if t.quant_step <= 0 {
            return Err(ChurnError::Config("quant_step must be positive".into()));
        }
        if t.max_depth > MAX_TREE_DEPTH {
            return Err(ChurnError::Config(format!(
                "max_depth must be at most {MAX_TREE_DEPTH}, got {}",
                t.max_depth
            )));
        }
        self.validate_tuning()?;
        if self.data.target.is_empty() {
            return Err(ChurnError::Config("target column name is empty".into()));
        }

        let mut warnings = Vec::new();
        if t.n_estimators == 0 {
            warnings.push("n_estimators is 0, the model will only predict the prior".to_string());
        }
        if t.max_depth == 0 {
            warnings.push("max_depth is 0, trees will be single leaves".to_string());
        }
        if t.learning_rate > 1.0 {
            warnings.push(format!("learning_rate {} is unusually large", t.learning_rate));
        }
        if t.lambda < 0.0 {
            warnings.push("lambda is negative".to_string());
        }

        if warnings.is_empty() {
            info!("Configuration validation passed");
        } else {
            warn!("Configuration validation warnings: {:?}", warnings);
        }
        Ok(warnings)
    }

    fn validate_tuning(&self) -> Result<()> {
        let tuning = &self.tuning;
        if tuning.folds < 2 {
            return Err(ChurnError::Config(format!(
                "tuning folds must be at least 2, got {}",
                tuning.folds
            )));
        }
        if !(tuning.threshold > 0.0 && tuning.threshold < 1.0) {
            return Err(ChurnError::Config(format!(
                "tuning threshold must be in (0, 1), got {}",
                tuning.threshold
            )));
        }
        if tuning.n_estimators.is_empty() || tuning.max_depth.is_empty() {
            return Err(ChurnError::Config("tuning grid is empty".into()));
        }
        if let Some(depth) = tuning.max_depth.iter().find(|&&d| d > MAX_TREE_DEPTH) {
            return Err(ChurnError::Config(format!(
                "tuning max_depth must be at most {MAX_TREE_DEPTH}, got {depth}"
            )));
        }
        Ok(())
    }
}
