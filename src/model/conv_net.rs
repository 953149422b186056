//! 1-D convolutional fraud classifier
//!
//! Architecture: Input [batch, 1, 7]
//!   → Conv1d(32, k=2) → ReLU → MaxPool(2)
//!   → Conv1d(64, k=2) → ReLU → MaxPool(2)
//!   → Conv1d(64, k=2) → ReLU → Flatten
//!   → Dense(64) → ReLU → Dropout(0.5) → Dense(1)
//!
//! Each convolution pads one zero on both sides. Unpadded, the length-7 row
//! shrinks to 1 before the third convolution and the stack cannot be built.

use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::pool::{MaxPool1d, MaxPool1dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig1d};
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::features::{FeatureVector, FEATURE_DIM};
use crate::{FraudError, NetworkConfig, Result};

const CONV_PADDING: usize = 1;

impl NetworkConfig {
    fn conv_len(&self, len: usize) -> Option<usize> {
        (len + 2 * CONV_PADDING + 1).checked_sub(self.kernel_size)
    }

    fn pool_len(&self, len: usize) -> Option<usize> {
        len.checked_sub(self.pool_size).map(|l| l / self.pool_size + 1)
    }

    /// Sequence length reaching the flatten step for an input of `input_len`
    pub fn output_length(&self, input_len: usize) -> Option<usize> {
        if self.kernel_size == 0 || self.pool_size == 0 {
            return None;
        }
        let len = self.conv_len(input_len)?;
        let len = self.pool_len(len)?;
        let len = self.conv_len(len)?;
        let len = self.pool_len(len)?;
        self.conv_len(len).filter(|&l| l > 0)
    }

    /// Width of the flattened convolution output
    pub fn flattened_dim(&self) -> Option<usize> {
        self.output_length(FEATURE_DIM)
            .map(|len| len * self.conv_channels[2])
    }

    pub fn validate(&self) -> Result<()> {
        if self.conv_channels.iter().any(|&c| c == 0) || self.dense_units == 0 {
            return Err(FraudError::Config("layer widths must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(FraudError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.flattened_dim().is_none() {
            return Err(FraudError::Config(format!(
                "kernel_size {} / pool_size {} leave no sequence for {} features",
                self.kernel_size, self.pool_size, FEATURE_DIM
            )));
        }
        Ok(())
    }
}

/// Convolutional binary classifier over the scaled feature row
#[derive(Module, Debug)]
pub struct FraudConvNet<B: Backend> {
    conv1: Conv1d<B>,
    pool1: MaxPool1d,
    conv2: Conv1d<B>,
    pool2: MaxPool1d,
    conv3: Conv1d<B>,
    dense: Linear<B>,
    dropout: Dropout,
    output: Linear<B>,
    /// Flattened width feeding the dense layer
    flattened_dim: usize,
}

impl<B: Backend> FraudConvNet<B> {
    /// Create a freshly initialized network
    pub fn new(device: &B::Device, config: &NetworkConfig) -> Result<Self> {
        config.validate()?;
        let flattened_dim = config.flattened_dim().unwrap_or_default();
        let [c1, c2, c3] = config.conv_channels;

        let conv = |c_in: usize, c_out: usize| -> Conv1d<B> {
            Conv1dConfig::new(c_in, c_out, config.kernel_size)
                .with_padding(PaddingConfig1d::Explicit(CONV_PADDING))
                .init(device)
        };
        let pool = || -> MaxPool1d {
            MaxPool1dConfig::new(config.pool_size)
                .with_stride(config.pool_size)
                .init()
        };

        Ok(FraudConvNet {
            conv1: conv(1, c1),
            pool1: pool(),
            conv2: conv(c1, c2),
            pool2: pool(),
            conv3: conv(c2, c3),
            dense: LinearConfig::new(flattened_dim, config.dense_units).init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
            output: LinearConfig::new(config.dense_units, 1).init(device),
            flattened_dim,
        })
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Scaled features [batch, 1, 7]
    ///
    /// # Returns
    /// Fraud logits [batch, 1]; apply sigmoid for probabilities
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let x = self.pool1.forward(relu(self.conv1.forward(x)));
        let x = self.pool2.forward(relu(self.conv2.forward(x)));
        let x = relu(self.conv3.forward(x));

        let batch_size = x.dims()[0];
        let x = x.reshape([batch_size, self.flattened_dim]);

        let x = relu(self.dense.forward(x));
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }

    /// Fraud probabilities [batch, 1]
    pub fn forward_probability(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        sigmoid(self.forward(x))
    }
}

/// Pack scaled rows into a [batch, 1, 7] input tensor
pub fn rows_to_tensor<B: Backend>(rows: &[FeatureVector], device: &B::Device) -> Tensor<B, 3> {
    let data: Vec<f32> = rows.iter().flat_map(|r| r.iter().map(|&v| v as f32)).collect();
    Tensor::<B, 1>::from_floats(data.as_slice(), device).reshape([rows.len(), 1, FEATURE_DIM])
}
