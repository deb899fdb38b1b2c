//! Gradient Boosted Decision Tree (GBDT) trainer
//!
//! Logistic-loss boosting with exact-greedy CART splits. Features, gradients,
//! hessians, leaf values and running log-odds are fixed-point integers at
//! `SCALE`; only the sigmoid that turns log-odds into probabilities runs in
//! floating point. Row and column sampling draw from a seeded LCG stream per
//! round, so a given config and dataset always yield the same model.

use churn_core::config::TrainingConfig;
use churn_core::gbdt::{contribution, sigmoid, to_fixed, Model, Tree, SCALE};
use tracing::{debug, info, instrument};

use crate::cart::{CartBuilder, SortedColumns, TreeConfig};
use crate::dataset::Dataset;
use crate::deterministic::LcgRng;
use crate::errors::TrainerError;

/// GBDT training configuration. Fractions and rates are fixed-point at
/// `SCALE`.
#[derive(Clone, Debug, PartialEq)]
pub struct GbdtConfig {
    pub num_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub min_child_weight: i64,
    pub lambda: i64,
    pub learning_rate: i64, // Fixed-point, e.g., 34_000 = 0.034
    pub subsample: i64,
    pub colsample_bytree: i64,
    pub quant_step: i64,
    /// Weight applied to positive-class gradients
    pub scale_pos_weight: i64,
    pub seed: u64,
}

impl Default for GbdtConfig {
    fn default() -> Self {
        Self::from_training_config(&TrainingConfig::default(), 1.0)
    }
}

impl GbdtConfig {
    pub fn from_training_config(config: &TrainingConfig, scale_pos_weight: f64) -> Self {
        Self {
            num_trees: config.n_estimators,
            max_depth: config.max_depth,
            min_samples_leaf: config.min_samples_leaf,
            min_child_weight: to_fixed(config.min_child_weight),
            lambda: to_fixed(config.lambda),
            learning_rate: to_fixed(config.learning_rate),
            subsample: to_fixed(config.subsample),
            colsample_bytree: to_fixed(config.colsample_bytree),
            quant_step: config.quant_step,
            scale_pos_weight: to_fixed(scale_pos_weight),
            seed: config.seed,
        }
    }

    fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            min_child_weight: self.min_child_weight,
            lambda: self.lambda,
            quant_step: self.quant_step,
        }
    }
}

/// GBDT trainer
pub struct GbdtTrainer {
    config: GbdtConfig,
}

impl GbdtTrainer {
    pub fn new(config: GbdtConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GbdtConfig {
        &self.config
    }

    /// Train a GBDT model on the given dataset
    #[instrument(skip_all, fields(rows = dataset.len(), features = dataset.feature_count()))]
    pub fn train(&self, dataset: &Dataset) -> Result<Model, TrainerError> {
        if dataset.is_empty() {
            return Err(TrainerError::Training("cannot train on an empty dataset".to_string()));
        }
        if self.config.scale_pos_weight <= 0 {
            return Err(TrainerError::Training(format!(
                "scale_pos_weight must be positive, got {}",
                self.config.scale_pos_weight
            )));
        }

        let n_samples = dataset.len();
        let feature_count = dataset.feature_count();
        let sorted = SortedColumns::new(&dataset.features, feature_count);

        let bias = self.calculate_bias(&dataset.labels);
        let mut predictions = vec![bias; n_samples];
        let mut trees = Vec::with_capacity(self.config.num_trees);

        info!(
            "Training {} trees (depth {}, learning rate {}) on {} samples x {} features",
            self.config.num_trees,
            self.config.max_depth,
            self.config.learning_rate as f64 / SCALE as f64,
            n_samples,
            feature_count
        );

        for tree_idx in 0..self.config.num_trees {
            let mut rng = LcgRng::derive(self.config.seed, tree_idx as u64);
            let in_sample = self.sample_rows(&mut rng, n_samples);
            let allowed = self.sample_features(&mut rng, feature_count);

            let (gradients, hessians) = self.calculate_gradients_hessians(&dataset.labels, &predictions);

            let builder = CartBuilder::new(&dataset.features, &gradients, &hessians, self.config.tree_config());
            let tree = Tree::new(builder.build(&sorted, &in_sample, &allowed), self.config.learning_rate);

            // Update predictions with tree output scaled by learning rate
            for (pred, row) in predictions.iter_mut().zip(&dataset.features) {
                *pred = pred.saturating_add(contribution(&tree, row, SCALE));
            }

            debug!(
                "Tree {}/{}: {} nodes, depth {}",
                tree_idx + 1,
                self.config.num_trees,
                tree.nodes.len(),
                tree.depth()
            );
            if (tree_idx + 1) % 50 == 0 {
                info!("Trained {}/{} trees", tree_idx + 1, self.config.num_trees);
            }
            trees.push(tree);
        }

        let model = Model::new(trees, bias, feature_count);
        model.validate().map_err(|e| TrainerError::Training(e.to_string()))?;
        Ok(model)
    }

    /// Positive-class probabilities for every row of `dataset`
    pub fn predict_proba(model: &Model, dataset: &Dataset) -> Vec<f64> {
        dataset
            .features
            .iter()
            .map(|row| sigmoid(model.score(row) as f64 / model.scale as f64))
            .collect()
    }

    /// Initial log-odds of the weighted positive rate
    fn calculate_bias(&self, labels: &[u8]) -> i64 {
        let positives = labels.iter().filter(|&&y| y == 1).count();
        let negatives = labels.len() - positives;
        if positives == 0 || negatives == 0 {
            return 0;
        }
        let weight = self.config.scale_pos_weight as f64 / SCALE as f64;
        to_fixed((weight * positives as f64 / negatives as f64).ln())
    }

    /// Gradients and hessians of the weighted logistic loss
    /// gradient = w * (p - y), hessian = w * p * (1 - p)
    fn calculate_gradients_hessians(&self, labels: &[u8], predictions: &[i64]) -> (Vec<i64>, Vec<i64>) {
        let positive_weight = self.config.scale_pos_weight as f64 / SCALE as f64;
        labels
            .iter()
            .zip(predictions)
            .map(|(&y, &pred)| {
                let p = sigmoid(pred as f64 / SCALE as f64);
                let (target, weight) = if y == 1 { (1.0, positive_weight) } else { (0.0, 1.0) };
                let gradient = to_fixed(weight * (p - target));
                // Keep the hessian strictly positive so leaf values stay finite
                let hessian = to_fixed(weight * p * (1.0 - p)).max(1);
                (gradient, hessian)
            })
            .unzip()
    }

    fn sample_rows(&self, rng: &mut LcgRng, n_samples: usize) -> Vec<bool> {
        if self.config.subsample >= SCALE {
            return vec![true; n_samples];
        }
        let mask: Vec<bool> = (0..n_samples)
            .map(|_| rng.next_unit_micro() < self.config.subsample)
            .collect();
        if mask.iter().any(|&m| m) {
            mask
        } else {
            vec![true; n_samples]
        }
    }

    fn sample_features(&self, rng: &mut LcgRng, feature_count: usize) -> Vec<usize> {
        if self.config.colsample_bytree >= SCALE {
            return (0..feature_count).collect();
        }
        let k = ((feature_count as i128 * i128::from(self.config.colsample_bytree) + i128::from(SCALE / 2))
            / i128::from(SCALE)) as usize;
        rng.sample_indices(feature_count, k.max(1))
    }
}
