//! Training loop and loss computation

use burn::data::dataloader::DataLoaderBuilder;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};

use crate::data::dataset::{FraudBatch, FraudBatcher, FraudDataset};
use crate::model::FraudConvNet;
use crate::training::metrics::{Metrics, TrainingHistory};
use crate::{FraudError, Result, TrainingConfig};

/// Binary cross-entropy computed directly on logits
///
/// Uses `max(x, 0) - x * y + ln(1 + exp(-|x|))`, which keeps a gradient of
/// `sigmoid(x) - y` even when the sigmoid saturates.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCrossEntropy;

impl BinaryCrossEntropy {
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        let softplus = (logits.clone().abs().neg().exp() + 1.0).log();
        let loss = logits.clone().clamp_min(0.0) - logits * targets + softplus;
        loss.mean()
    }
}

fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

/// Trainer for the convolutional classifier
pub struct ClassifierTrainer<B: AutodiffBackend> {
    model: FraudConvNet<B>,
    optimizer: OptimizerAdaptor<Adam, FraudConvNet<B>, B>,
    loss_fn: BinaryCrossEntropy,
    config: TrainingConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> ClassifierTrainer<B> {
    /// Create a new trainer
    pub fn new(model: FraudConvNet<B>, config: TrainingConfig, device: B::Device) -> Self {
        let optimizer = AdamConfig::new().init();

        ClassifierTrainer {
            model,
            optimizer,
            loss_fn: BinaryCrossEntropy,
            config,
            device,
        }
    }

    /// Train the model.
    ///
    /// The trailing `validation_split` fraction of `dataset` is only evaluated,
    /// never used for gradient updates. The model after the last epoch is
    /// returned; validation metrics are reported, not used to pick a model.
    pub fn train(mut self, dataset: FraudDataset) -> Result<(FraudConvNet<B>, TrainingHistory)> {
        self.config.validate()?;

        let (train_dataset, val_dataset) = dataset.split_trailing(self.config.validation_split);
        if train_dataset.is_empty() {
            return Err(FraudError::Training(
                "no rows left for training after the validation split".to_string(),
            ));
        }
        if train_dataset.positives() == 0 || train_dataset.positives() == train_dataset.len() {
            log::warn!(
                "Training slice contains a single class ({} fraud of {} rows)",
                train_dataset.positives(),
                train_dataset.len()
            );
        }

        log::info!(
            "Training on {} rows ({} fraud), validating on {} rows",
            train_dataset.len(),
            train_dataset.positives(),
            val_dataset.len()
        );

        let batch_size = self.config.batch_size.min(train_dataset.len());
        let mut train_builder =
            DataLoaderBuilder::new(FraudBatcher::<B>::new(self.device.clone())).batch_size(batch_size);
        if let Some(seed) = self.config.shuffle_seed {
            train_builder = train_builder.shuffle(seed);
        }
        let train_loader = train_builder.build(train_dataset);

        let val_loader = if val_dataset.is_empty() {
            None
        } else {
            Some(
                DataLoaderBuilder::new(FraudBatcher::<B::InnerBackend>::new(self.device.clone()))
                    .batch_size(self.config.batch_size)
                    .build(val_dataset),
            )
        };

        let mut history = TrainingHistory::new();
        let epochs = self.config.epochs;

        log::info!("Starting training for {} epochs", epochs);

        for epoch in 0..epochs {
            let train_metrics = self.train_epoch(epoch, train_loader.iter())?;
            let val_metrics = val_loader
                .as_ref()
                .map(|loader| self.validate_epoch(loader.iter()));

            history.record_epoch(epoch, &train_metrics, val_metrics.as_ref());

            match &val_metrics {
                Some(val) => log::info!(
                    "Epoch {}/{}: Train: {} | Val: {}",
                    epoch + 1,
                    epochs,
                    train_metrics,
                    val
                ),
                None => log::info!("Epoch {}/{}: Train: {}", epoch + 1, epochs, train_metrics),
            }
        }

        Ok((self.model, history))
    }

    /// Train one epoch
    fn train_epoch(
        &mut self,
        epoch: usize,
        loader: impl Iterator<Item = FraudBatch<B>>,
    ) -> Result<Metrics> {
        let mut metrics = Metrics::new();

        for batch in loader {
            let logits = self.model.forward(batch.features);
            let loss = self.loss_fn.forward(logits.clone(), batch.labels.clone());

            let loss_val: f32 = loss.clone().into_scalar().elem();
            if !loss_val.is_finite() {
                return Err(FraudError::Training(format!(
                    "loss diverged to {} in epoch {}",
                    loss_val,
                    epoch + 1
                )));
            }

            // Backward pass
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);

            // Update weights
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);

            let probabilities = tensor_values(sigmoid(logits));
            let labels = tensor_values(batch.labels);
            log::debug!("batch loss {:.5} over {} rows", loss_val, labels.len());
            metrics.update(loss_val, &probabilities, &labels);
        }

        Ok(metrics)
    }

    /// Validate one epoch in inference mode (dropout off, no gradients)
    fn validate_epoch(&self, loader: impl Iterator<Item = FraudBatch<B::InnerBackend>>) -> Metrics {
        let model = self.model.valid();
        let mut metrics = Metrics::new();

        for batch in loader {
            let logits = model.forward(batch.features);
            let loss = self.loss_fn.forward(logits.clone(), batch.labels.clone());
            let loss_val: f32 = loss.into_scalar().elem();

            let probabilities = tensor_values(sigmoid(logits));
            let labels = tensor_values(batch.labels);
            metrics.update(loss_val, &probabilities, &labels);
        }

        metrics
    }
}
