//! Hyper-parameter search
//!
//! Exhaustive grid over tree count and depth. Each candidate is scored by the
//! mean accuracy of stratified k-fold cross-validation on the training split;
//! the test split stays untouched. Candidates train in parallel but every
//! fold is seeded, so the ranking is the same on every run.

use anyhow::{Context, Result};
use churn_core::config::{TrainingConfig, TuningConfig};
use churn_core::metrics::evaluate;
use churn_core::tracking::{FileTracker, RunHandle};
use churn_core::{encode_training, preprocess, PipelineConfig, RawFrame};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::dataset::Dataset;
use crate::errors::TrainerError;
use crate::pipeline::{check_quality, close_run, load_input};
use crate::trainer::{GbdtConfig, GbdtTrainer};

/// Every candidate with its fold scores
pub const TUNING_RESULTS_ARTIFACT: &str = "tuning_results.json";

/// Cross-validated score of one grid point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialResult {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub fold_accuracy: Vec<f64>,
    pub mean_accuracy: f64,
}

/// Summary of a tuning run
#[derive(Debug, Clone, Serialize)]
pub struct TuningOutcome {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub best: TrialResult,
    pub trials: Vec<TrialResult>,
}

/// Grid search over [`TuningConfig`], everything else fixed by the base
/// [`TrainingConfig`]
pub struct GridSearch {
    base: TrainingConfig,
    tuning: TuningConfig,
}

impl GridSearch {
    pub fn new(base: TrainingConfig, tuning: TuningConfig) -> Self {
        Self { base, tuning }
    }

    /// (n_estimators, max_depth) pairs in grid order
    pub fn candidates(&self) -> Vec<(usize, usize)> {
        self.tuning
            .n_estimators
            .iter()
            .flat_map(|&n| self.tuning.max_depth.iter().map(move |&d| (n, d)))
            .collect()
    }

    /// Score every candidate; results keep grid order
    #[instrument(skip_all, fields(rows = dataset.len(), folds = self.tuning.folds))]
    pub fn run(&self, dataset: &Dataset) -> Result<Vec<TrialResult>, TrainerError> {
        let folds = dataset.stratified_folds(self.tuning.folds, self.base.seed)?;
        let candidates = self.candidates();
        info!("Searching {} candidates with {}-fold CV", candidates.len(), folds.len());

        candidates
            .par_iter()
            .map(|&(n_estimators, max_depth)| self.score(&folds, n_estimators, max_depth))
            .collect()
    }

    fn score(
        &self,
        folds: &[(Dataset, Dataset)],
        n_estimators: usize,
        max_depth: usize,
    ) -> Result<TrialResult, TrainerError> {
        let training = TrainingConfig {
            n_estimators,
            max_depth,
            ..self.base.clone()
        };

        let mut fold_accuracy = Vec::with_capacity(folds.len());
        for (train, valid) in folds {
            let config = GbdtConfig::from_training_config(&training, train.scale_pos_weight()?);
            let model = GbdtTrainer::new(config).train(train)?;
            let proba = GbdtTrainer::predict_proba(&model, valid);
            fold_accuracy.push(evaluate(&valid.labels, &proba, self.tuning.threshold).accuracy);
        }
        let mean_accuracy = fold_accuracy.iter().sum::<f64>() / fold_accuracy.len() as f64;
        debug!(n_estimators, max_depth, mean_accuracy, "candidate scored");

        Ok(TrialResult {
            n_estimators,
            max_depth,
            fold_accuracy,
            mean_accuracy,
        })
    }
}

/// Highest mean accuracy; ties go to the earlier grid point
pub fn best_trial(trials: &[TrialResult]) -> Option<&TrialResult> {
    trials.iter().fold(None, |best: Option<&TrialResult>, trial| match best {
        Some(current) if current.mean_accuracy >= trial.mean_accuracy => Some(current),
        _ => Some(trial),
    })
}

/// Experiment that tuning runs are recorded under. Kept apart from the
/// training experiment so serving never picks up a run without a model.
pub fn tuning_experiment(config: &PipelineConfig) -> String {
    format!("{} Tuning", config.tracking.experiment)
}

/// Load, validate and encode `input`, then grid-search on its training split
/// inside a tracked run
pub fn run_tuning(config: &PipelineConfig, input: &Path) -> Result<TuningOutcome> {
    let raw = load_input(config, input)?;

    let tracker = FileTracker::new(&config.tracking.root);
    let mut run = tracker
        .start_run(&tuning_experiment(config))
        .context("Failed to start tracking run")?;

    let result = tune_in_run(config, &raw, input, &mut run).map(|(best, trials)| TuningOutcome {
        run_id: run.run_id().to_string(),
        run_dir: run.dir().to_path_buf(),
        best,
        trials,
    });
    close_run(run, result)
}

fn tune_in_run(
    config: &PipelineConfig,
    raw: &RawFrame,
    input: &Path,
    run: &mut RunHandle,
) -> Result<(TrialResult, Vec<TrialResult>)> {
    let tuning = &config.tuning;
    run.log_param("model", "gbdt")?;
    run.log_param("n_estimators_grid", tuning.n_estimators.clone())?;
    run.log_param("max_depth_grid", tuning.max_depth.clone())?;
    run.log_param("folds", tuning.folds)?;
    run.log_param("scoring", "accuracy")?;
    run.log_param("threshold", tuning.threshold)?;
    run.log_param("seed", config.training.seed)?;
    run.log_param("input", input.display().to_string())?;

    check_quality(raw, run)?;
    let frame = preprocess(raw, &config.data)?;
    let encoding = encode_training(&frame, &config.data.target)?;
    let dataset = Dataset::from_encoded(&encoding.frame)?;
    let (train, _) = dataset.stratified_split(config.training.test_size, config.training.seed)?;

    let trials = GridSearch::new(config.training.clone(), tuning.clone()).run(&train)?;
    run.log_json(TUNING_RESULTS_ARTIFACT, &trials)?;

    let best = best_trial(&trials)
        .cloned()
        .ok_or_else(|| TrainerError::Training("tuning grid is empty".to_string()))?;
    run.log_param("best_n_estimators", best.n_estimators)?;
    run.log_param("best_max_depth", best.max_depth)?;
    run.log_metric("best_cv_accuracy", best.mean_accuracy)?;

    info!("═══════════════════════════════════════════");
    info!(
        "Best params: n_estimators = {}, max_depth = {} (CV accuracy {:.3})",
        best.n_estimators, best.max_depth, best.mean_accuracy
    );
    Ok((best, trials))
}

#[cfg(test)]
mod tests {
    use super::*;
    use churn_core::gbdt::SCALE;

    /// Positive exactly when the first feature exceeds 5
    fn threshold_dataset() -> Dataset {
        let features: Vec<Vec<i64>> = (0..120)
            .map(|i| vec![(i % 10) * SCALE, ((i * 7) % 3) * SCALE])
            .collect();
        let labels = features.iter().map(|f| u8::from(f[0] > 5 * SCALE)).collect();
        Dataset::new(features, labels, vec!["a".into(), "b".into()]).unwrap()
    }

    fn search(n_estimators: Vec<usize>, max_depth: Vec<usize>) -> GridSearch {
        let base = TrainingConfig {
            learning_rate: 0.3,
            ..TrainingConfig::default()
        };
        let tuning = TuningConfig {
            n_estimators,
            max_depth,
            ..TuningConfig::default()
        };
        GridSearch::new(base, tuning)
    }

    #[test]
    fn test_candidates_in_grid_order() {
        let grid = search(vec![10, 20], vec![1, 3]);
        assert_eq!(grid.candidates(), vec![(10, 1), (10, 3), (20, 1), (20, 3)]);
    }

    #[test]
    fn test_trees_beat_the_prior() -> Result<(), TrainerError> {
        let trials = search(vec![0, 20], vec![2]).run(&threshold_dataset())?;
        assert_eq!(trials.len(), 2);
        assert!(trials.iter().all(|t| t.fold_accuracy.len() == 3));

        // No trees leaves every row at the balanced prior
        assert!(trials[0].mean_accuracy < 0.5);
        assert!(trials[1].mean_accuracy > 0.9);
        assert_eq!(best_trial(&trials), Some(&trials[1]));
        Ok(())
    }

    #[test]
    fn test_search_is_deterministic() -> Result<(), TrainerError> {
        let grid = search(vec![5, 15], vec![1, 2]);
        let first = grid.run(&threshold_dataset())?;
        let second = grid.run(&threshold_dataset())?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_best_trial_prefers_earlier_on_ties() {
        let trial = |n, acc| TrialResult {
            n_estimators: n,
            max_depth: 1,
            fold_accuracy: vec![acc],
            mean_accuracy: acc,
        };
        let trials = vec![trial(10, 0.8), trial(20, 0.9), trial(30, 0.9)];
        assert_eq!(best_trial(&trials).map(|t| t.n_estimators), Some(20));
        assert_eq!(best_trial(&[]), None);
    }
}
