//! Fixed-point training datasets and stratified splitting
//!
//! Converts an encoded frame into integer features at `SCALE` with 0/1
//! labels, and splits it per class with a seeded shuffle so both halves keep
//! the original class ratio.

use churn_core::encoder::EncodedFrame;
use churn_core::gbdt::to_fixed;

use crate::deterministic::LcgRng;
use crate::errors::TrainerError;

/// Training dataset with fixed-point features and binary labels
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    pub features: Vec<Vec<i64>>,
    pub labels: Vec<u8>,
    pub feature_names: Vec<String>,
}

impl Dataset {
    pub fn new(
        features: Vec<Vec<i64>>,
        labels: Vec<u8>,
        feature_names: Vec<String>,
    ) -> Result<Self, TrainerError> {
        if features.len() != labels.len() {
            return Err(TrainerError::Dataset(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if let Some(row) = features.iter().position(|r| r.len() != feature_names.len()) {
            return Err(TrainerError::Dataset(format!(
                "row {} has {} features, expected {}",
                row,
                features[row].len(),
                feature_names.len()
            )));
        }
        Ok(Self {
            features,
            labels,
            feature_names,
        })
    }

    /// Convert an encoded frame; the frame must carry labels
    pub fn from_encoded(frame: &EncodedFrame) -> Result<Self, TrainerError> {
        let labels = frame
            .labels()
            .ok_or_else(|| TrainerError::Dataset("encoded frame has no labels".to_string()))?
            .to_vec();
        let features = frame
            .rows()
            .iter()
            .map(|row| row.iter().map(|&v| to_fixed(v)).collect())
            .collect();
        Self::new(features, labels, frame.columns().to_vec())
    }

    /// Get number of samples
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    /// (negatives, positives)
    pub fn class_counts(&self) -> (usize, usize) {
        let positives = self.labels.iter().filter(|&&y| y == 1).count();
        (self.labels.len() - positives, positives)
    }

    /// Class-imbalance compensation: negatives / positives
    pub fn scale_pos_weight(&self) -> Result<f64, TrainerError> {
        let (negatives, positives) = self.class_counts();
        if positives == 0 {
            return Err(TrainerError::Dataset(
                "no positive samples; cannot compute class weight".to_string(),
            ));
        }
        Ok(negatives as f64 / positives as f64)
    }

    /// Rows at `indices`, in that order
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            feature_names: self.feature_names.clone(),
        }
    }

    /// Per-class seeded split. Each class contributes
    /// `round(class_size * test_size)` rows to the test set, clamped so both
    /// sides keep at least one row of every class. Returns (train, test).
    pub fn stratified_split(&self, test_size: f64, seed: u64) -> Result<(Self, Self), TrainerError> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(TrainerError::Dataset(format!(
                "test size must be in (0, 1), got {test_size}"
            )));
        }

        let mut rng = LcgRng::new(seed);
        let mut train_idx = Vec::new();
        let mut test_idx = Vec::new();
        for class in [0u8, 1] {
            let mut members: Vec<usize> = (0..self.len()).filter(|&i| self.labels[i] == class).collect();
            if members.len() < 2 {
                return Err(TrainerError::Dataset(format!(
                    "class {} has {} samples; stratified split needs at least 2",
                    class,
                    members.len()
                )));
            }
            rng.shuffle(&mut members);
            let n_test = ((members.len() as f64 * test_size).round() as usize).clamp(1, members.len() - 1);
            test_idx.extend_from_slice(&members[..n_test]);
            train_idx.extend_from_slice(&members[n_test..]);
        }
        train_idx.sort_unstable();
        test_idx.sort_unstable();

        Ok((self.subset(&train_idx), self.subset(&test_idx)))
    }

    /// Seeded stratified k-fold partition. The rows of each class are
    /// shuffled and dealt round-robin over the folds, so every row validates
    /// exactly once. Returns one (train, validation) pair per fold.
    pub fn stratified_folds(&self, k: usize, seed: u64) -> Result<Vec<(Self, Self)>, TrainerError> {
        if k < 2 {
            return Err(TrainerError::Dataset(format!("need at least 2 folds, got {k}")));
        }

        let mut rng = LcgRng::new(seed);
        let mut fold_of = vec![0usize; self.len()];
        for class in [0u8, 1] {
            let mut members: Vec<usize> = (0..self.len()).filter(|&i| self.labels[i] == class).collect();
            if members.len() < k {
                return Err(TrainerError::Dataset(format!(
                    "class {} has {} samples; {}-fold split needs at least {}",
                    class,
                    members.len(),
                    k,
                    k
                )));
            }
            rng.shuffle(&mut members);
            for (pos, &row) in members.iter().enumerate() {
                fold_of[row] = pos % k;
            }
        }

        Ok((0..k)
            .map(|fold| {
                let (valid, train): (Vec<usize>, Vec<usize>) =
                    (0..self.len()).partition(|&row| fold_of[row] == fold);
                (self.subset(&train), self.subset(&valid))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use churn_core::gbdt::SCALE;

    fn dataset(n: usize, positives: usize) -> Dataset {
        let features = (0..n).map(|i| vec![i as i64 * SCALE]).collect();
        let labels = (0..n).map(|i| u8::from(i < positives)).collect();
        Dataset::new(features, labels, vec!["x".to_string()]).unwrap()
    }

    #[test]
    fn test_from_encoded_scales_features() {
        let frame = churn_core::RawFrame::from_reader("a,Churn\n1.5,Yes\n-2,No\n".as_bytes()).unwrap();
        let encoding = churn_core::encode_training(&frame, "Churn").unwrap();
        let ds = Dataset::from_encoded(&encoding.frame).unwrap();
        assert_eq!(ds.features, vec![vec![1_500_000], vec![-2_000_000]]);
        assert_eq!(ds.labels, vec![1, 0]);
        assert_eq!(ds.feature_names, vec!["a"]);
    }

    #[test]
    fn test_scale_pos_weight_twenty_percent() {
        let ds = dataset(100, 20);
        assert_eq!(ds.class_counts(), (80, 20));
        assert_eq!(ds.scale_pos_weight().unwrap(), 4.0);
        assert!(dataset(10, 0).scale_pos_weight().is_err());
    }

    #[test]
    fn test_stratified_split_preserves_ratio() {
        let ds = dataset(100, 20);
        let (train, test) = ds.stratified_split(0.2, 42).unwrap();
        assert_eq!(train.len(), 80);
        assert_eq!(test.len(), 20);
        assert_eq!(train.class_counts(), (64, 16));
        assert_eq!(test.class_counts(), (16, 4));
        assert_eq!(train.scale_pos_weight().unwrap(), 4.0);
    }

    #[test]
    fn test_split_is_seeded() {
        let ds = dataset(50, 10);
        let (a, _) = ds.stratified_split(0.3, 1).unwrap();
        let (b, _) = ds.stratified_split(0.3, 1).unwrap();
        let (c, _) = ds.stratified_split(0.3, 2).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.features, c.features);
    }

    #[test]
    fn test_split_rejects_tiny_class() {
        assert!(dataset(10, 1).stratified_split(0.2, 42).is_err());
        assert!(dataset(10, 5).stratified_split(1.0, 42).is_err());
    }

    #[test]
    fn test_folds_validate_each_row_once() {
        let ds = dataset(30, 9);
        let folds = ds.stratified_folds(3, 42).unwrap();
        assert_eq!(folds.len(), 3);

        let mut seen: Vec<i64> = Vec::new();
        for (train, valid) in &folds {
            assert_eq!(train.len() + valid.len(), 30);
            assert_eq!(valid.class_counts(), (7, 3));
            assert!(train.scale_pos_weight().is_ok());
            seen.extend(valid.features.iter().map(|row| row[0]));
        }
        seen.sort_unstable();
        let all: Vec<i64> = (0..30).map(|i| i * SCALE).collect();
        assert_eq!(seen, all);

        assert_eq!(folds, ds.stratified_folds(3, 42).unwrap());
    }

    #[test]
    fn test_folds_reject_small_classes() {
        assert!(dataset(10, 2).stratified_folds(3, 42).is_err());
        assert!(dataset(10, 5).stratified_folds(1, 42).is_err());
    }
}
