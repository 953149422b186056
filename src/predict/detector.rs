//! Fitted model and the train/predict entry point

use std::path::Path;

use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use serde::{Deserialize, Serialize};

use super::store::ModelStore;
use crate::data::dataset::FraudDataset;
use crate::features::{FeatureExtractor, FeatureVector, ScalerState, StandardScaler};
use crate::model::conv_net::rows_to_tensor;
use crate::model::FraudConvNet;
use crate::training::{ClassifierTrainer, TrainingHistory};
use crate::{
    Config, FraudError, Mode, NetworkConfig, Result, ScoringConfig, TrainingConfig,
    TransactionRecord,
};

/// Rows per forward pass when scoring
const PREDICT_BATCH_SIZE: usize = 1024;

/// Scaler statistics and classifier weights that were fitted together
#[derive(Debug, Clone)]
pub struct FittedModel<B: Backend> {
    scaler: ScalerState,
    network: NetworkConfig,
    classifier: FraudConvNet<B>,
    device: B::Device,
}

impl<B: Backend> FittedModel<B> {
    pub(crate) fn from_parts(
        scaler: ScalerState,
        network: NetworkConfig,
        classifier: FraudConvNet<B>,
        device: B::Device,
    ) -> Self {
        FittedModel {
            scaler,
            network,
            classifier,
            device,
        }
    }

    pub fn scaler(&self) -> &ScalerState {
        &self.scaler
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn classifier(&self) -> &FraudConvNet<B> {
        &self.classifier
    }

    /// Fraud probability for each record, in input order
    pub fn predict(&self, records: &[TransactionRecord]) -> Result<Vec<f32>> {
        let matrix = FeatureExtractor::new().extract_features(records)?;
        Ok(self.predict_features(&matrix))
    }

    /// Fraud probability for each unscaled feature row
    pub fn predict_features(&self, matrix: &[FeatureVector]) -> Vec<f32> {
        let scaled = self.scaler.apply_all(matrix);

        let mut probabilities = Vec::with_capacity(scaled.len());
        for chunk in scaled.chunks(PREDICT_BATCH_SIZE) {
            let input = rows_to_tensor::<B>(chunk, &self.device);
            let output = self.classifier.forward_probability(input);
            probabilities.extend(output.into_data().iter::<f32>());
        }
        probabilities
    }
}

/// Fit the scaler and classifier on a labeled batch.
///
/// The scaler sees every row; the classifier trains on all but the trailing
/// validation slice. Returns the inference copy of the classifier.
pub fn fit<B: AutodiffBackend>(
    records: &[TransactionRecord],
    training: &TrainingConfig,
    network: &NetworkConfig,
    device: &B::Device,
) -> Result<(FittedModel<B::InnerBackend>, TrainingHistory)> {
    training.validate()?;
    network.validate()?;

    if records.is_empty() {
        return Err(FraudError::malformed(0, "record", "no transactions to train on"));
    }
    let (matrix, labels) = FeatureExtractor::new().extract_labeled(records)?;

    let mut scaler = StandardScaler::new().rejecting_degenerate(training.reject_degenerate_features);
    let scaled = scaler.fit_transform(&matrix)?;
    let scaler = scaler
        .into_state()
        .ok_or(FraudError::NotFitted("Feature scaler"))?;

    let dataset = FraudDataset::new(scaled, &labels);
    let model = FraudConvNet::<B>::new(device, network)?;
    let trainer = ClassifierTrainer::new(model, training.clone(), device.clone());
    let (model, history) = trainer.train(dataset)?;

    let fitted = FittedModel::from_parts(scaler, network.clone(), model.valid(), device.clone());
    Ok((fitted, history))
}

/// Outcome of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub rows: usize,
    pub fraud_rows: usize,
    pub degenerate_features: Vec<String>,
    pub history: TrainingHistory,
}

/// One scored transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTransaction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub timestamp: String,
    pub amount: f64,
    pub fraud_probability: f32,
    pub suspicious: bool,
}

/// Batch totals over a scored upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringSummary {
    pub total: usize,
    pub suspicious: usize,
    pub total_amount: f64,
    pub suspicious_amount: f64,
    pub threshold: f32,
}

impl ScoringSummary {
    pub fn suspicious_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.suspicious as f64 / self.total as f64
        }
    }
}

/// Scored rows plus their summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringOutcome {
    pub transactions: Vec<ScoredTransaction>,
    pub summary: ScoringSummary,
}

/// Result of [`FraudDetector::run`]
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Trained(TrainingReport),
    Predicted(Vec<f32>),
}

/// Train-or-score facade over one current fitted model
///
/// Predicting before a model is fitted or loaded fails with `NotFitted` and
/// leaves the detector untouched. A failed fit keeps the previous model.
pub struct FraudDetector<B: AutodiffBackend> {
    fitted: Option<FittedModel<B::InnerBackend>>,
    training: TrainingConfig,
    network: NetworkConfig,
    scoring: ScoringConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> FraudDetector<B> {
    /// Create an unfitted detector
    pub fn new(config: &Config, device: B::Device) -> Self {
        FraudDetector {
            fitted: None,
            training: config.training.clone(),
            network: config.model.clone(),
            scoring: config.scoring.clone(),
            device,
        }
    }

    /// Create a detector around a previously saved model
    pub fn load<P: AsRef<Path>>(config: &Config, path: P, device: B::Device) -> Result<Self> {
        let fitted = ModelStore::load::<B::InnerBackend, _>(path, &device)?;
        let mut detector = Self::new(config, device);
        detector.network = fitted.network().clone();
        detector.fitted = Some(fitted);
        Ok(detector)
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn fitted(&self) -> Option<&FittedModel<B::InnerBackend>> {
        self.fitted.as_ref()
    }

    fn require_fitted(&self) -> Result<&FittedModel<B::InnerBackend>> {
        self.fitted.as_ref().ok_or(FraudError::NotFitted("Fraud classifier"))
    }

    /// Fit a fresh scaler and classifier, replacing the current model on success
    pub fn fit(&mut self, records: &[TransactionRecord]) -> Result<TrainingReport> {
        let (fitted, history) = fit::<B>(records, &self.training, &self.network, &self.device)?;

        let fraud_rows = records
            .iter()
            .filter(|r| r.is_fraud.is_some_and(|v| v == 1.0))
            .count();
        let report = TrainingReport {
            rows: records.len(),
            fraud_rows,
            degenerate_features: fitted
                .scaler()
                .degenerate_names()
                .into_iter()
                .map(String::from)
                .collect(),
            history,
        };

        self.fitted = Some(fitted);
        Ok(report)
    }

    /// Fraud probability for each record, in input order
    pub fn predict(&self, records: &[TransactionRecord]) -> Result<Vec<f32>> {
        self.require_fitted()?.predict(records)
    }

    /// Dispatch on an explicit mode
    pub fn run(&mut self, mode: Mode, records: &[TransactionRecord]) -> Result<RunOutcome> {
        log::debug!("Running detector in {} mode on {} rows", mode, records.len());
        match mode {
            Mode::Train => self.fit(records).map(RunOutcome::Trained),
            Mode::Predict => self.predict(records).map(RunOutcome::Predicted),
        }
    }

    /// Score records and flag those at or above the configured threshold
    pub fn score(&self, records: &[TransactionRecord]) -> Result<ScoringOutcome> {
        self.score_with_threshold(records, self.scoring.suspicious_threshold)
    }

    pub fn score_with_threshold(
        &self,
        records: &[TransactionRecord],
        threshold: f32,
    ) -> Result<ScoringOutcome> {
        let probabilities = self.predict(records)?;

        let mut summary = ScoringSummary {
            threshold,
            ..ScoringSummary::default()
        };
        let transactions: Vec<ScoredTransaction> = records
            .iter()
            .zip(probabilities)
            .map(|(record, fraud_probability)| {
                let suspicious = fraud_probability >= threshold;
                summary.total += 1;
                summary.total_amount += record.amount;
                if suspicious {
                    summary.suspicious += 1;
                    summary.suspicious_amount += record.amount;
                }
                ScoredTransaction {
                    transaction_id: record.transaction_id.clone(),
                    timestamp: record.timestamp.clone(),
                    amount: record.amount,
                    fraud_probability,
                    suspicious,
                }
            })
            .collect();

        log::info!(
            "Scored {} transactions, {} flagged at threshold {:.2}",
            summary.total,
            summary.suspicious,
            threshold
        );
        Ok(ScoringOutcome {
            transactions,
            summary,
        })
    }

    /// Persist the current model
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        ModelStore::save(path, self.require_fitted()?)
    }
}
