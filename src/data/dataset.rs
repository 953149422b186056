//! Burn Dataset implementation for scaled transaction rows

use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::features::FeatureVector;
use crate::model::conv_net::rows_to_tensor;

/// One scaled transaction with its label
#[derive(Debug, Clone, PartialEq)]
pub struct FraudSample {
    pub features: FeatureVector,
    /// 1.0 = fraud, 0.0 = legitimate
    pub label: f32,
}

/// In-memory dataset of scaled, labeled transactions
#[derive(Debug, Clone, Default)]
pub struct FraudDataset {
    samples: Vec<FraudSample>,
}

impl FraudDataset {
    /// Pair scaled rows with labels by index
    pub fn new(features: Vec<FeatureVector>, labels: &[f32]) -> Self {
        let samples = features
            .into_iter()
            .zip(labels.iter().copied())
            .map(|(features, label)| FraudSample { features, label })
            .collect();
        FraudDataset { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of fraud-labeled samples
    pub fn positives(&self) -> usize {
        self.samples.iter().filter(|s| s.label >= 0.5).count()
    }

    /// Split off the trailing `validation_split` fraction as a validation set.
    ///
    /// The training count is `floor(n * (1 - validation_split))`; every
    /// remaining row is held out. Row order is kept.
    pub fn split_trailing(self, validation_split: f64) -> (Self, Self) {
        let n = self.samples.len();
        let n_train = ((n as f64) * (1.0 - validation_split)).floor() as usize;
        let mut train_samples = self.samples;
        let val_samples = train_samples.split_off(n_train.min(n));

        (
            FraudDataset { samples: train_samples },
            FraudDataset { samples: val_samples },
        )
    }
}

impl Dataset<FraudSample> for FraudDataset {
    fn get(&self, index: usize) -> Option<FraudSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Batch of transactions for training
#[derive(Debug, Clone)]
pub struct FraudBatch<B: Backend> {
    /// Scaled features: [batch, 1, 7]
    pub features: Tensor<B, 3>,
    /// Fraud labels: [batch, 1]
    pub labels: Tensor<B, 2>,
}

/// Batcher for creating training batches
#[derive(Clone)]
pub struct FraudBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> FraudBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        FraudBatcher { device }
    }
}

impl<B: Backend> burn::data::dataloader::batcher::Batcher<B, FraudSample, FraudBatch<B>>
    for FraudBatcher<B>
{
    fn batch(&self, items: Vec<FraudSample>, _device: &B::Device) -> FraudBatch<B> {
        let batch_size = items.len();
        let rows: Vec<FeatureVector> = items.iter().map(|s| s.features).collect();
        let labels: Vec<f32> = items.iter().map(|s| s.label).collect();

        let features = rows_to_tensor::<B>(&rows, &self.device);
        let labels = Tensor::<B, 1>::from_floats(labels.as_slice(), &self.device)
            .reshape([batch_size, 1]);

        FraudBatch { features, labels }
    }
}
