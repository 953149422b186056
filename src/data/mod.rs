//! Data ingestion
//!
//! CSV readers for transaction uploads, synthetic data and the burn dataset
//! used for training.

pub mod dataset;
pub mod synth;
pub mod transactions;

pub use dataset::{FraudBatch, FraudBatcher, FraudDataset, FraudSample};
pub use synth::synthetic_transactions;
pub use transactions::{read_transactions, read_transactions_from};
