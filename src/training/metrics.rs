//! Training metrics and evaluation
//!
//! Accuracy and ROC AUC are reported per epoch; neither gates training.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Metrics accumulated during training/evaluation
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    /// Sum of batch losses
    pub total_loss: f64,
    /// Number of batches accumulated
    pub batch_count: usize,
    /// Number of correct predictions at the 0.5 threshold
    pub correct: usize,
    /// Predicted probability and label for every row seen
    scored: Vec<(f32, f32)>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update metrics with a batch result
    pub fn update(&mut self, loss: f32, probabilities: &[f32], labels: &[f32]) {
        self.total_loss += loss as f64;
        self.batch_count += 1;
        self.correct += probabilities
            .iter()
            .zip(labels.iter())
            .filter(|(p, t)| (**p >= 0.5) == (**t >= 0.5))
            .count();
        self.scored
            .extend(probabilities.iter().copied().zip(labels.iter().copied()));
    }

    /// Get average batch loss
    pub fn avg_loss(&self) -> f64 {
        if self.batch_count == 0 {
            0.0
        } else {
            self.total_loss / self.batch_count as f64
        }
    }

    pub fn total_predictions(&self) -> usize {
        self.scored.len()
    }

    /// Fraction of rows classified correctly at 0.5
    pub fn accuracy(&self) -> f64 {
        if self.scored.is_empty() {
            0.0
        } else {
            self.correct as f64 / self.scored.len() as f64
        }
    }

    /// Area under the ROC curve; `None` when only one class was seen
    pub fn auc(&self) -> Option<f64> {
        let probabilities: Vec<f32> = self.scored.iter().map(|(p, _)| *p).collect();
        let labels: Vec<f32> = self.scored.iter().map(|(_, t)| *t).collect();
        roc_auc(&probabilities, &labels)
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Loss: {:.4} | Acc: {:.2}% | AUC: ",
            self.avg_loss(),
            self.accuracy() * 100.0
        )?;
        match self.auc() {
            Some(auc) => write!(f, "{:.4}", auc),
            None => write!(f, "n/a"),
        }
    }
}

/// ROC AUC via the rank-sum (Mann-Whitney) statistic, ties sharing the mean rank
pub fn roc_auc(probabilities: &[f32], labels: &[f32]) -> Option<f64> {
    let n_pos = labels.iter().filter(|&&t| t >= 0.5).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 || probabilities.len() != labels.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    order.sort_by(|&a, &b| probabilities[a].total_cmp(&probabilities[b]));

    let mut pos_rank_sum = 0.0f64;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && probabilities[order[j + 1]] == probabilities[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean
        let mean_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if labels[idx] >= 0.5 {
                pos_rank_sum += mean_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Per-epoch summary kept in the training history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub loss: f64,
    pub accuracy: f64,
    pub auc: Option<f64>,
}

impl From<&Metrics> for EpochSummary {
    fn from(metrics: &Metrics) -> Self {
        EpochSummary {
            loss: metrics.avg_loss(),
            accuracy: metrics.accuracy(),
            auc: metrics.auc(),
        }
    }
}

/// Training history for tracking progress
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train: Vec<EpochSummary>,
    /// Empty when training ran without a validation slice
    pub validation: Vec<EpochSummary>,
    pub best_val_loss: Option<f64>,
    pub best_epoch: Option<usize>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record metrics for an epoch
    pub fn record_epoch(&mut self, epoch: usize, train: &Metrics, val: Option<&Metrics>) {
        self.train.push(EpochSummary::from(train));

        if let Some(val) = val {
            let summary = EpochSummary::from(val);
            if self.best_val_loss.map_or(true, |best| summary.loss < best) {
                self.best_val_loss = Some(summary.loss);
                self.best_epoch = Some(epoch);
            }
            self.validation.push(summary);
        }
    }

    pub fn epochs(&self) -> usize {
        self.train.len()
    }

    pub fn last_train(&self) -> Option<&EpochSummary> {
        self.train.last()
    }

    pub fn last_validation(&self) -> Option<&EpochSummary> {
        self.validation.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auc_perfect_and_inverted() {
        let labels = [0.0, 0.0, 1.0, 1.0];
        assert_eq!(roc_auc(&[0.1, 0.2, 0.8, 0.9], &labels), Some(1.0));
        assert_eq!(roc_auc(&[0.9, 0.8, 0.2, 0.1], &labels), Some(0.0));
    }

    #[test]
    fn test_auc_ties_count_half() {
        let labels = [0.0, 1.0];
        assert_eq!(roc_auc(&[0.5, 0.5], &labels), Some(0.5));

        // One positive above both negatives, one tied with a negative
        let auc = roc_auc(&[0.1, 0.4, 0.4, 0.9], &[0.0, 0.0, 1.0, 1.0]).unwrap();
        assert!((auc - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_auc_single_class() {
        assert_eq!(roc_auc(&[0.1, 0.9], &[1.0, 1.0]), None);
        assert_eq!(roc_auc(&[], &[]), None);
    }

    #[test]
    fn test_metrics_accumulate() {
        let mut metrics = Metrics::new();
        metrics.update(0.6, &[0.9, 0.2], &[1.0, 0.0]);
        metrics.update(0.4, &[0.7, 0.3], &[0.0, 1.0]);

        assert!((metrics.avg_loss() - 0.5).abs() < 1e-6);
        assert_eq!(metrics.total_predictions(), 4);
        assert!((metrics.accuracy() - 0.5).abs() < 1e-12);
        assert!(metrics.auc().is_some());

        metrics.reset();
        assert_eq!(metrics.total_predictions(), 0);
        assert_eq!(metrics.accuracy(), 0.0);
    }

    #[test]
    fn test_history_tracks_best_validation() {
        let mut history = TrainingHistory::new();

        let mut train = Metrics::new();
        train.update(0.5, &[0.6], &[1.0]);

        let mut val1 = Metrics::new();
        val1.update(0.7, &[0.4], &[1.0]);
        let mut val2 = Metrics::new();
        val2.update(0.3, &[0.8], &[1.0]);

        history.record_epoch(0, &train, Some(&val1));
        history.record_epoch(1, &train, Some(&val2));
        history.record_epoch(2, &train, None);

        assert_eq!(history.epochs(), 3);
        assert_eq!(history.validation.len(), 2);
        assert_eq!(history.best_epoch, Some(1));
        assert_eq!(history.last_validation().map(|v| v.loss), Some(0.3f32 as f64));
    }
}
