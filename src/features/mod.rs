//! Feature extraction and scaling
//!
//! Converts raw transaction rows into standardized model input.

pub mod extractor;
pub mod scaler;

pub use extractor::{FeatureExtractor, FeatureSet, FeatureVector, FEATURE_DIM, FEATURE_NAMES};
pub use scaler::{ScalerState, StandardScaler};
