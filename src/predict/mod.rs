//! Fitting, scoring and persistence of fraud models

pub mod detector;
pub mod store;

pub use detector::{
    fit, FittedModel, FraudDetector, RunOutcome, ScoredTransaction, ScoringOutcome,
    ScoringSummary, TrainingReport,
};
pub use store::{ArtifactInfo, ModelStore, ARTIFACT_FORMAT_VERSION};
