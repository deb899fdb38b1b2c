//! Boosted-tree classifier artifact
//!
//! The model is an additive ensemble over fixed-point features. `score`
//! returns the raw log-odds at [`SCALE`]; `predict_proba` maps that through
//! the logistic function. Artifacts are canonical JSON identified by their
//! BLAKE3 hash, and each model records the hash of the feature schema it was
//! trained against.

use super::tree::Tree;
use super::{sigmoid, to_fixed};
use crate::serde_canon::{hash_canonical_hex, to_canonical_json, CanonicalError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model validation failed: {0}")]
    ValidationFailed(String),

    #[error("Feature count mismatch: model expects {expected}, got {actual}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Canonical serialization error: {0}")]
    Canonical(#[from] CanonicalError),
}

/// Fixed-point scale for features, thresholds, leaves and logits (1e6)
pub const SCALE: i64 = 1_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub version: i32,
    pub scale: i64,
    pub trees: Vec<Tree>,
    /// Initial log-odds, fixed-point
    pub bias: i64,
    pub feature_count: usize,
    /// Hash of the feature schema this model was fitted on
    #[serde(default)]
    pub schema_hash: String,
}

impl Model {
    pub fn new(trees: Vec<Tree>, bias: i64, feature_count: usize) -> Self {
        Self {
            version: 1,
            scale: SCALE,
            trees,
            bias,
            feature_count,
            schema_hash: String::new(),
        }
    }

    pub fn with_schema_hash(mut self, schema_hash: impl Into<String>) -> Self {
        self.schema_hash = schema_hash.into();
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.version != 1 {
            return Err(ModelError::ValidationFailed(format!(
                "Unsupported model version: {}",
                self.version
            )));
        }
        if self.scale != SCALE {
            return Err(ModelError::ValidationFailed(format!(
                "Unsupported scale: {}",
                self.scale
            )));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate()
                .map_err(|e| ModelError::ValidationFailed(format!("Tree {i}: {e}")))?;
            let out_of_range = tree
                .nodes
                .iter()
                .any(|n| !n.is_leaf() && n.feature_idx as usize >= self.feature_count);
            if out_of_range {
                return Err(ModelError::ValidationFailed(format!(
                    "Tree {i} splits on a feature beyond {}",
                    self.feature_count
                )));
            }
        }
        Ok(())
    }

    /// Fixed-point log-odds for a fixed-point feature vector
    pub fn score(&self, features: &[i64]) -> i64 {
        let mut sum = self.bias;
        for tree in &self.trees {
            sum = sum.saturating_add(contribution(tree, features, self.scale));
        }
        sum
    }

    /// Positive-class probability for a float feature row
    pub fn predict_proba(&self, features: &[f64]) -> Result<f64, ModelError> {
        if features.len() != self.feature_count {
            return Err(ModelError::FeatureCount {
                expected: self.feature_count,
                actual: features.len(),
            });
        }
        let fixed: Vec<i64> = features.iter().map(|&v| to_fixed(v)).collect();
        Ok(sigmoid(self.score(&fixed) as f64 / self.scale as f64))
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn to_canonical_json(&self) -> Result<String, ModelError> {
        Ok(to_canonical_json(self)?)
    }

    pub fn hash_hex(&self) -> Result<String, ModelError> {
        Ok(hash_canonical_hex(self)?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        fs::write(path, self.to_canonical_json()?)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let json = fs::read_to_string(path)?;
        let model: Model = serde_json::from_str(&json)?;
        model.validate()?;
        Ok(model)
    }
}

/// Shrunk leaf value of `tree` for `features`. The trainer uses this same
/// function when updating its running predictions.
pub fn contribution(tree: &Tree, features: &[i64], scale: i64) -> i64 {
    let weighted = i128::from(tree.evaluate(features)) * i128::from(tree.weight);
    (weighted / i128::from(scale)).clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbdt::tree::Node;

    fn two_tree_model() -> Model {
        let t1 = Tree::new(
            vec![
                Node::internal(0, 0, 50 * SCALE, 1, 2),
                Node::leaf(1, -2 * SCALE),
                Node::leaf(2, 2 * SCALE),
            ],
            SCALE / 2,
        );
        let t2 = Tree::new(
            vec![
                Node::internal(0, 1, SCALE, 1, 2),
                Node::leaf(1, -SCALE),
                Node::leaf(2, SCALE),
            ],
            SCALE,
        );
        Model::new(vec![t1, t2], 0, 2)
    }

    #[test]
    fn test_score_applies_tree_weight() {
        let model = two_tree_model();
        // t1: 30 <= 50 -> -2 * 0.5 = -1; t2: 0 <= 1 -> -1
        assert_eq!(model.score(&[30 * SCALE, 0]), -2 * SCALE);
        // t1: 60 > 50 -> 2 * 0.5 = 1; t2: 2 > 1 -> 1
        assert_eq!(model.score(&[60 * SCALE, 2 * SCALE]), 2 * SCALE);
    }

    #[test]
    fn test_predict_proba() -> Result<(), ModelError> {
        let model = two_tree_model();
        let low = model.predict_proba(&[30.0, 0.0])?;
        let high = model.predict_proba(&[60.0, 2.0])?;
        assert!((low - sigmoid(-2.0)).abs() < 1e-9);
        assert!((high - sigmoid(2.0)).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_feature_count_enforced() {
        let model = two_tree_model();
        assert!(matches!(
            model.predict_proba(&[1.0]),
            Err(ModelError::FeatureCount { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_validation_rejects_out_of_range_feature() {
        let mut model = two_tree_model();
        assert!(model.validate().is_ok());
        model.feature_count = 1;
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_hash_tracks_content() -> Result<(), ModelError> {
        let a = two_tree_model();
        let b = two_tree_model().with_schema_hash("abc");
        assert_eq!(a.hash_hex()?, two_tree_model().hash_hex()?);
        assert_ne!(a.hash_hex()?, b.hash_hex()?);
        Ok(())
    }

    #[test]
    fn test_save_load() -> Result<(), ModelError> {
        let model = two_tree_model().with_schema_hash("deadbeef");
        let file = tempfile::NamedTempFile::new()?;
        model.save_json(file.path())?;
        let loaded = Model::load_json(file.path())?;
        assert_eq!(model, loaded);
        Ok(())
    }
}
