//! Binary classification metrics
//!
//! Undefined ratios (no predicted positives, no actual positives) evaluate to
//! 0 rather than NaN so they can always be logged. ROC-AUC is undefined when
//! only one class is present and is reported as `None`.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn harmonic(p: f64, r: f64) -> f64 {
    if p + r == 0.0 {
        0.0
    } else {
        2.0 * p * r / (p + r)
    }
}

impl ConfusionMatrix {
    pub fn from_predictions(labels: &[u8], predicted: &[u8]) -> Self {
        let mut cm = Self::default();
        for (&y, &p) in labels.iter().zip(predicted) {
            match (y != 0, p != 0) {
                (true, true) => cm.true_positives += 1,
                (false, true) => cm.false_positives += 1,
                (false, false) => cm.true_negatives += 1,
                (true, false) => cm.false_negatives += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        harmonic(self.precision(), self.recall())
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    /// Precision of the negative class
    fn negative_precision(&self) -> f64 {
        ratio(self.true_negatives, self.true_negatives + self.false_negatives)
    }

    /// Recall of the negative class
    fn negative_recall(&self) -> f64 {
        ratio(self.true_negatives, self.true_negatives + self.false_positives)
    }
}

/// Metrics for one evaluation at a fixed decision threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy: f64,
    pub roc_auc: Option<f64>,
    pub confusion: ConfusionMatrix,
}

/// Apply `threshold` (probability `>= threshold` is positive) and score
pub fn evaluate(labels: &[u8], proba: &[f64], threshold: f64) -> ClassificationMetrics {
    let predicted: Vec<u8> = proba.iter().map(|&p| u8::from(p >= threshold)).collect();
    let confusion = ConfusionMatrix::from_predictions(labels, &predicted);
    ClassificationMetrics {
        threshold,
        precision: confusion.precision(),
        recall: confusion.recall(),
        f1: confusion.f1(),
        accuracy: confusion.accuracy(),
        roc_auc: roc_auc(labels, proba),
        confusion,
    }
}

/// Area under the ROC curve via the Mann-Whitney rank statistic. Tied scores
/// receive their average rank.
pub fn roc_auc(labels: &[u8], scores: &[f64]) -> Option<f64> {
    let n = labels.len().min(scores.len());
    let positives = labels[..n].iter().filter(|&&y| y != 0).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; the tie group spans ranks start+1 ..= end
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        let tied_positives = order[start..end].iter().filter(|&&i| labels[i] != 0).count();
        positive_rank_sum += avg_rank * tied_positives as f64;
        start = end;
    }

    let p = positives as f64;
    let u = positive_rank_sum - p * (p + 1.0) / 2.0;
    Some(u / (p * negatives as f64))
}

/// Per-class precision/recall/F1/support table
pub fn classification_report(confusion: &ConfusionMatrix) -> String {
    let cm = confusion;
    let rows = [
        (
            "0",
            cm.negative_precision(),
            cm.negative_recall(),
            cm.true_negatives + cm.false_positives,
        ),
        (
            "1",
            cm.precision(),
            cm.recall(),
            cm.true_positives + cm.false_negatives,
        ),
    ];

    let mut out = String::new();
    let _ = writeln!(out, "{:>12} {:>10} {:>10} {:>10} {:>10}", "", "precision", "recall", "f1-score", "support");
    for (class, p, r, support) in rows {
        let _ = writeln!(
            out,
            "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}",
            class,
            p,
            r,
            harmonic(p, r),
            support
        );
    }
    let _ = writeln!(
        out,
        "{:>12} {:>10} {:>10} {:>10.2} {:>10}",
        "accuracy",
        "",
        "",
        cm.accuracy(),
        cm.total()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_and_ratios() {
        let labels = [1, 1, 0, 0, 1, 0];
        let proba = [0.9, 0.3, 0.4, 0.1, 0.6, 0.2];
        let m = evaluate(&labels, &proba, 0.35);

        assert_eq!(
            m.confusion,
            ConfusionMatrix {
                true_positives: 2,
                false_positives: 1,
                true_negatives: 2,
                false_negatives: 1,
            }
        );
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1 - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let m = evaluate(&[1], &[0.35], 0.35);
        assert_eq!(m.confusion.true_positives, 1);
    }

    #[test]
    fn test_no_predicted_positives() {
        let m = evaluate(&[1, 0], &[0.1, 0.2], 0.5);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
    }

    #[test]
    fn test_roc_auc() {
        assert_eq!(roc_auc(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&[1, 1, 0, 0], &[0.1, 0.2, 0.8, 0.9]), Some(0.0));
        // All scores tied
        assert_eq!(roc_auc(&[0, 1, 0, 1], &[0.5; 4]), Some(0.5));
        // sklearn reference: 0.75
        let auc = roc_auc(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]).unwrap();
        assert!((auc - 0.75).abs() < 1e-12);
        assert_eq!(roc_auc(&[1, 1], &[0.2, 0.3]), None);
    }

    #[test]
    fn test_report_lists_both_classes() {
        let m = evaluate(&[1, 0, 1, 0], &[0.9, 0.1, 0.2, 0.6], 0.5);
        let report = classification_report(&m.confusion);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].trim_start().starts_with('0'));
        assert!(lines[2].trim_start().starts_with('1'));
        assert!(lines[3].contains("accuracy"));
    }
}
