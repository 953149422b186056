//! Model artifact persistence
//!
//! A fitted scaler and classifier are always written and read together as one
//! JSON document. Saves go through a temporary file in the target directory
//! and an atomic rename, so a concurrent load sees either the old or the new
//! artifact, never a partial one.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use super::detector::FittedModel;
use crate::features::{ScalerState, FEATURE_NAMES};
use crate::model::FraudConvNet;
use crate::{FraudError, NetworkConfig, Result};

/// Bumped whenever the artifact layout changes
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactFile {
    format_version: u32,
    feature_names: Vec<String>,
    scaler: ScalerState,
    network: NetworkConfig,
    /// Classifier parameters as a burn named-MessagePack record
    weights: Vec<u8>,
}

/// Header fields of an artifact, readable without a backend
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactInfo {
    pub format_version: u32,
    pub scaler: ScalerState,
    pub network: NetworkConfig,
    pub weights_bytes: usize,
}

fn recorder() -> NamedMpkBytesRecorder<FullPrecisionSettings> {
    NamedMpkBytesRecorder::<FullPrecisionSettings>::new()
}

/// Serialize classifier parameters
pub(crate) fn classifier_bytes<B: Backend>(classifier: &FraudConvNet<B>) -> Result<Vec<u8>> {
    recorder()
        .record(classifier.clone().into_record(), ())
        .map_err(|e| FraudError::Io(std::io::Error::other(e.to_string())))
}

/// Reads and writes fitted models at caller-supplied paths
pub struct ModelStore;

impl ModelStore {
    /// Persist the fitted scaler and classifier as one artifact
    pub fn save<B: Backend, P: AsRef<Path>>(path: P, model: &FittedModel<B>) -> Result<()> {
        let path = path.as_ref();

        let artifact = ArtifactFile {
            format_version: ARTIFACT_FORMAT_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            scaler: model.scaler().clone(),
            network: model.network().clone(),
            weights: classifier_bytes(model.classifier())?,
        };
        let content = serde_json::to_vec(&artifact)
            .map_err(|e| FraudError::Io(std::io::Error::other(e.to_string())))?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&content)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| FraudError::Io(e.error))?;

        log::info!(
            "Saved model artifact to {} ({} bytes)",
            path.display(),
            content.len()
        );
        Ok(())
    }

    /// Restore a fitted model saved with [`ModelStore::save`]
    pub fn load<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<FittedModel<B>> {
        let path = path.as_ref();
        let artifact = read_artifact(path)?;
        let corrupt = |reason: String| FraudError::CorruptArtifact {
            path: path.to_path_buf(),
            reason,
        };

        let record = recorder()
            .load(artifact.weights, device)
            .map_err(|e| corrupt(format!("cannot decode classifier weights: {}", e)))?;

        let fresh = FraudConvNet::<B>::new(device, &artifact.network).map_err(|e| corrupt(e.to_string()))?;
        let expected_params = fresh.num_params();
        let classifier = fresh.load_record(record);
        if classifier.num_params() != expected_params {
            return Err(corrupt(format!(
                "classifier has {} parameters, network config expects {}",
                classifier.num_params(),
                expected_params
            )));
        }

        log::info!("Loaded model artifact from {}", path.display());
        Ok(FittedModel::from_parts(
            artifact.scaler,
            artifact.network,
            classifier,
            device.clone(),
        ))
    }

    /// Read the artifact header without building the classifier
    pub fn inspect<P: AsRef<Path>>(path: P) -> Result<ArtifactInfo> {
        let artifact = read_artifact(path.as_ref())?;
        Ok(ArtifactInfo {
            format_version: artifact.format_version,
            scaler: artifact.scaler,
            network: artifact.network,
            weights_bytes: artifact.weights.len(),
        })
    }
}

fn read_artifact(path: &Path) -> Result<ArtifactFile> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(FraudError::ArtifactNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(FraudError::Io(e)),
    };
    let corrupt = |reason: String| FraudError::CorruptArtifact {
        path: path.to_path_buf(),
        reason,
    };

    let artifact: ArtifactFile = serde_json::from_slice(&content)
        .map_err(|e| corrupt(format!("cannot parse artifact: {}", e)))?;

    if artifact.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported format version {} (expected {})",
            artifact.format_version, ARTIFACT_FORMAT_VERSION
        )));
    }
    if artifact.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
        return Err(corrupt(format!(
            "feature order {:?} does not match {:?}",
            artifact.feature_names, FEATURE_NAMES
        )));
    }
    if !artifact.scaler.is_valid() {
        return Err(corrupt("scaler statistics are not finite or not positive".to_string()));
    }
    artifact
        .network
        .validate()
        .map_err(|e| corrupt(e.to_string()))?;

    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::detector::tests::{fit_small_model, sample_records};
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model").join("fraud.json");
        let model = fit_small_model();

        ModelStore::save(&path, &model).unwrap();
        let loaded = ModelStore::load::<TestBackend, _>(&path, &Default::default()).unwrap();

        assert_eq!(loaded.scaler(), model.scaler());
        assert_eq!(loaded.network(), model.network());
        assert_eq!(loaded.classifier().num_params(), model.classifier().num_params());

        let records = sample_records(12);
        assert_eq!(loaded.predict(&records).unwrap(), model.predict(&records).unwrap());
    }

    #[test]
    fn test_save_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fraud.json");

        ModelStore::save(&path, &fit_small_model()).unwrap();
        let second = fit_small_model();
        ModelStore::save(&path, &second).unwrap();

        let loaded = ModelStore::load::<TestBackend, _>(&path, &Default::default()).unwrap();
        assert_eq!(loaded.scaler(), second.scaler());

        // Only the artifact remains; no temporary files left behind
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_load_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelStore::load::<TestBackend, _>(dir.path().join("absent.json"), &Default::default())
            .unwrap_err();
        assert!(matches!(err, FraudError::ArtifactNotFound(_)));
    }

    #[test]
    fn test_load_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fraud.json");
        fs::write(&path, b"not a model").unwrap();

        let err = ModelStore::load::<TestBackend, _>(&path, &Default::default()).unwrap_err();
        assert!(matches!(err, FraudError::CorruptArtifact { .. }));
    }

    #[test]
    fn test_load_rejects_other_version_and_bad_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fraud.json");
        ModelStore::save(&path, &fit_small_model()).unwrap();

        let mut value: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        value["format_version"] = serde_json::json!(99);
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
        let err = ModelStore::load::<TestBackend, _>(&path, &Default::default()).unwrap_err();
        assert!(matches!(err, FraudError::CorruptArtifact { ref reason, .. } if reason.contains("version")));

        value["format_version"] = serde_json::json!(ARTIFACT_FORMAT_VERSION);
        value["weights"] = serde_json::json!([1, 2, 3]);
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
        let err = ModelStore::load::<TestBackend, _>(&path, &Default::default()).unwrap_err();
        assert!(matches!(err, FraudError::CorruptArtifact { .. }));
    }

    #[test]
    fn test_inspect_reads_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fraud.json");
        let model = fit_small_model();
        ModelStore::save(&path, &model).unwrap();

        let info = ModelStore::inspect(&path).unwrap();
        assert_eq!(info.format_version, ARTIFACT_FORMAT_VERSION);
        assert_eq!(&info.scaler, model.scaler());
        assert!(info.weights_bytes > 0);
    }
}
