//! UPI transaction fraud scoring
//!
//! Turns raw transaction rows into a fixed feature vector, standardizes it and
//! scores it with a small 1-D convolutional network trained on labeled history.

pub mod data;
pub mod features;
pub mod model;
pub mod predict;
pub mod training;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A single raw transaction row as read from an upload
///
/// The timestamp is kept as the source text; calendar features are derived
/// from it during extraction and never written back onto the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub amount: f64,
    pub timestamp: String,
    pub sender_account_age: f64,
    pub recipient_account_age: f64,
    pub sender_transaction_count: f64,
    pub recipient_transaction_count: f64,
    /// Fraud label, only present in training data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_fraud: Option<f64>,
}

/// Whether a call into the detector fits a new model or scores with the current one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Train,
    Predict,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => write!(f, "train"),
            Mode::Predict => write!(f, "predict"),
        }
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum FraudError {
    #[error("Malformed input at row {row}, field `{field}`: {message}")]
    MalformedInput {
        row: usize,
        field: String,
        message: String,
    },

    #[error("{0} is not fitted - train a model or load one first")]
    NotFitted(&'static str),

    #[error("Feature `{column}` has zero variance")]
    DegenerateFeature { column: &'static str },

    #[error("Model artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("Corrupt model artifact {}: {reason}", path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FraudError {
    /// Stable machine-readable kind for client-facing responses
    pub fn kind(&self) -> &'static str {
        match self {
            FraudError::MalformedInput { .. } | FraudError::Csv(_) => "malformed_input",
            FraudError::NotFitted(_) => "not_fitted",
            FraudError::DegenerateFeature { .. } => "degenerate_feature",
            FraudError::ArtifactNotFound(_) => "artifact_not_found",
            FraudError::CorruptArtifact { .. } => "corrupt_artifact",
            FraudError::Training(_) => "training",
            FraudError::Config(_) => "config",
            FraudError::Io(_) => "io",
        }
    }

    pub(crate) fn malformed(row: usize, field: &str, message: impl Into<String>) -> Self {
        FraudError::MalformedInput {
            row,
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Client-facing error body: a stable kind plus a readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub message: String,
}

impl From<&FraudError> for ErrorResponse {
    fn from(err: &FraudError) -> Self {
        ErrorResponse {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FraudError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub training: TrainingConfig,
    pub model: NetworkConfig,
    pub scoring: ScoringConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Trailing fraction of the training rows held out for monitoring
    pub validation_split: f64,
    pub learning_rate: f64,
    /// Shuffle training batches every epoch with this seed; `None` keeps row order
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
    /// Fail instead of substituting unit std for zero-variance features
    #[serde(default)]
    pub reject_degenerate_features: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 10,
            batch_size: 32,
            validation_split: 0.2,
            learning_rate: 1e-3,
            shuffle_seed: None,
            reject_degenerate_features: false,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(FraudError::Config("epochs must be greater than 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(FraudError::Config("batch_size must be greater than 0".to_string()));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(FraudError::Config(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(FraudError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Architecture of the convolutional classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Output channels of the three convolution layers
    pub conv_channels: [usize; 3],
    pub kernel_size: usize,
    pub pool_size: usize,
    pub dense_units: usize,
    pub dropout: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            conv_channels: [32, 64, 64],
            kernel_size: 2,
            pool_size: 2,
            dense_units: 64,
            dropout: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Probability at or above which a transaction is flagged as suspicious
    pub suspicious_threshold: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            suspicious_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub model_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            training: TrainingConfig::default(),
            model: NetworkConfig::default(),
            scoring: ScoringConfig::default(),
            data: DataConfig {
                model_path: "model/upi_fraud_model.json".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FraudError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| FraudError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| FraudError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();

        assert_eq!(parsed.training, config.training);
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.scoring, config.scoring);
        assert_eq!(parsed.data.model_path, config.data.model_path);
    }

    #[test]
    fn test_training_config_validation() {
        assert!(TrainingConfig::default().validate().is_ok());

        let bad_epochs = TrainingConfig {
            epochs: 0,
            ..TrainingConfig::default()
        };
        assert!(matches!(bad_epochs.validate(), Err(FraudError::Config(_))));

        let bad_split = TrainingConfig {
            validation_split: 1.0,
            ..TrainingConfig::default()
        };
        assert!(matches!(bad_split.validate(), Err(FraudError::Config(_))));

        let bad_batch = TrainingConfig {
            batch_size: 0,
            ..TrainingConfig::default()
        };
        assert!(matches!(bad_batch.validate(), Err(FraudError::Config(_))));
    }

    #[test]
    fn test_error_response_kind() {
        let err = FraudError::NotFitted("Feature scaler");
        let response = ErrorResponse::from(&err);
        assert_eq!(response.kind, "not_fitted");
        assert!(response.message.contains("Feature scaler"));

        let err = FraudError::malformed(4, "timestamp", "empty value");
        assert_eq!(ErrorResponse::from(&err).kind, "malformed_input");
        assert!(err.to_string().contains("row 4"));
    }
}
