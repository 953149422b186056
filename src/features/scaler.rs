//! Z-score standardization of feature matrices
//!
//! Statistics are computed once from the training batch and then frozen.
//! Inference batches are always scaled with the stored statistics.

use serde::{Deserialize, Serialize};

use super::extractor::{FeatureVector, FEATURE_DIM, FEATURE_NAMES};
use crate::{FraudError, Result};

/// Fitted per-feature statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub mean: [f64; FEATURE_DIM],
    pub std: [f64; FEATURE_DIM],
    /// Zero-variance columns whose std was replaced with 1
    pub degenerate: Vec<usize>,
}

impl ScalerState {
    /// Compute statistics from a training matrix (population std)
    pub fn from_matrix(matrix: &[FeatureVector]) -> Result<Self> {
        if matrix.is_empty() {
            return Err(FraudError::malformed(0, "features", "cannot fit scaler on an empty batch"));
        }

        let n = matrix.len() as f64;
        let mut mean = [0.0f64; FEATURE_DIM];
        for row in matrix {
            for (m, x) in mean.iter_mut().zip(row.iter()) {
                *m += x;
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut var = [0.0f64; FEATURE_DIM];
        for row in matrix {
            for j in 0..FEATURE_DIM {
                var[j] += (row[j] - mean[j]).powi(2);
            }
        }

        let mut std = [1.0f64; FEATURE_DIM];
        let mut degenerate = Vec::new();
        for j in 0..FEATURE_DIM {
            let s = (var[j] / n).sqrt();
            if s <= f64::EPSILON * mean[j].abs().max(1.0) {
                log::warn!(
                    "Feature `{}` has zero variance (constant {}); it carries no signal",
                    FEATURE_NAMES[j],
                    mean[j]
                );
                degenerate.push(j);
            } else {
                std[j] = s;
            }
        }

        Ok(ScalerState { mean, std, degenerate })
    }

    /// Standardize one row: (x - mean) / std
    pub fn apply(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = [0.0f64; FEATURE_DIM];
        for j in 0..FEATURE_DIM {
            out[j] = (row[j] - self.mean[j]) / self.std[j];
        }
        out
    }

    /// Standardize a whole matrix
    pub fn apply_all(&self, matrix: &[FeatureVector]) -> Vec<FeatureVector> {
        matrix.iter().map(|row| self.apply(row)).collect()
    }

    /// Names of the degenerate columns
    pub fn degenerate_names(&self) -> Vec<&'static str> {
        self.degenerate.iter().map(|&j| FEATURE_NAMES[j]).collect()
    }

    /// Sanity check for states read back from disk
    pub(crate) fn is_valid(&self) -> bool {
        self.mean.iter().all(|m| m.is_finite())
            && self.std.iter().all(|s| s.is_finite() && *s > 0.0)
            && self.degenerate.iter().all(|&j| j < FEATURE_DIM)
    }
}

/// Stateful scaler: `fit_transform` once, then `transform` any number of times
#[derive(Debug, Clone, Default)]
pub struct StandardScaler {
    state: Option<ScalerState>,
    reject_degenerate: bool,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail on zero-variance columns instead of substituting unit std
    pub fn rejecting_degenerate(mut self, reject: bool) -> Self {
        self.reject_degenerate = reject;
        self
    }

    /// Wrap already fitted statistics
    pub fn from_state(state: ScalerState) -> Self {
        StandardScaler {
            state: Some(state),
            reject_degenerate: false,
        }
    }

    /// Fit on the training matrix and return it standardized
    pub fn fit_transform(&mut self, matrix: &[FeatureVector]) -> Result<Vec<FeatureVector>> {
        let state = ScalerState::from_matrix(matrix)?;
        if self.reject_degenerate {
            if let Some(&j) = state.degenerate.first() {
                return Err(FraudError::DegenerateFeature {
                    column: FEATURE_NAMES[j],
                });
            }
        }

        let scaled = state.apply_all(matrix);
        self.state = Some(state);
        Ok(scaled)
    }

    /// Standardize with the fitted statistics; never refits
    pub fn transform(&self, matrix: &[FeatureVector]) -> Result<Vec<FeatureVector>> {
        let state = self.state.as_ref().ok_or(FraudError::NotFitted("Feature scaler"))?;
        Ok(state.apply_all(matrix))
    }

    pub fn state(&self) -> Option<&ScalerState> {
        self.state.as_ref()
    }

    pub fn into_state(self) -> Option<ScalerState> {
        self.state
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }
}
