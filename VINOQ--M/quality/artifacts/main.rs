//! Fitted artifacts: the feature scaler and the binary classifier.
//!
//! Both are read once at startup from JSON documents tagged by `kind`, validated
//! against the feature table, and then shared read-only for the process lifetime.

/// Binary classifier backends.
pub mod classifier;
/// Feature scaler backends.
pub mod scaler;

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::features::{feature_names, FEATURE_COUNT};

use self::{
    classifier::{BinaryClassifier, ClassifierArtifact},
    scaler::{FeatureScaler, ScalerArtifact},
};

/// Fatal artifact loading failure.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// File does not exist.
    #[error("artifact {} not found", .path.display())]
    Missing {
        /// Requested path.
        path: PathBuf,
    },
    /// File exists but cannot be read.
    #[error("reading artifact {}: {source}", .path.display())]
    Read {
        /// Requested path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// File is not a valid artifact document.
    #[error("parsing artifact {}: {source}", .path.display())]
    Parse {
        /// Requested path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// Document parsed but its contents are inconsistent.
    #[error("invalid artifact {}: {reason}", .path.display())]
    Invalid {
        /// Requested path.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },
}

/// Failure while running a loaded backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    /// Input matrix width differs from the fitted width.
    #[error("expected {expected} features, got {found}")]
    ShapeMismatch {
        /// Fitted feature count.
        expected: usize,
        /// Columns supplied.
        found: usize,
    },
    /// Backend produced something the decision rule cannot use.
    #[error("invalid model output: {0}")]
    InvalidOutput(String),
}

/// Scaler and classifier pair, ready to be injected into the service.
#[derive(Debug, Clone)]
pub struct LoadedArtifacts {
    /// Fitted scaler.
    pub scaler: Arc<dyn FeatureScaler>,
    /// Fitted classifier.
    pub classifier: Arc<dyn BinaryClassifier>,
}

/// Loads both artifacts; either failure aborts.
pub fn load_artifacts(
    model_path: impl AsRef<Path>,
    scaler_path: impl AsRef<Path>,
) -> Result<LoadedArtifacts, ArtifactError> {
    let classifier = load_classifier(model_path)?;
    let scaler = load_scaler(scaler_path)?;
    Ok(LoadedArtifacts { scaler, classifier })
}

/// Loads a scaler document.
pub fn load_scaler(path: impl AsRef<Path>) -> Result<Arc<dyn FeatureScaler>, ArtifactError> {
    let path = path.as_ref();
    let document: ScalerArtifact = read_document(path)?;
    check_feature_names(path, document.feature_names())?;
    document
        .build()
        .map_err(|reason| invalid(path, reason))
}

/// Loads a classifier document.
pub fn load_classifier(
    path: impl AsRef<Path>,
) -> Result<Arc<dyn BinaryClassifier>, ArtifactError> {
    let path = path.as_ref();
    let document: ClassifierArtifact = read_document(path)?;
    check_feature_names(path, document.feature_names())?;
    document
        .build()
        .map_err(|reason| invalid(path, reason))
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let contents = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ArtifactError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            ArtifactError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_str(&contents).map_err(|source| ArtifactError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn check_feature_names(path: &Path, names: Option<&[String]>) -> Result<(), ArtifactError> {
    let Some(names) = names else {
        return Ok(());
    };
    let expected = feature_names();
    if names.len() != FEATURE_COUNT || names.iter().zip(expected).any(|(a, b)| a != b) {
        return Err(invalid(
            path,
            format!("feature_names {names:?} do not match {expected:?}"),
        ));
    }
    Ok(())
}

fn invalid(path: &Path, reason: impl Into<String>) -> ArtifactError {
    ArtifactError::Invalid {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Ensures a fitted vector has one entry per feature and only finite values.
fn check_vector(name: &str, values: &[f64]) -> Result<(), String> {
    if values.len() != FEATURE_COUNT {
        return Err(format!(
            "{name} has {} entries, expected {FEATURE_COUNT}",
            values.len()
        ));
    }
    if let Some(idx) = values.iter().position(|value| !value.is_finite()) {
        return Err(format!("{name}[{idx}] is not finite"));
    }
    Ok(())
}
