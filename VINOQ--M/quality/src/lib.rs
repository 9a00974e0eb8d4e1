#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Vinoq wine quality inference: the ordered feature vector, the fitted scaler and
//! classifier artifacts, and the verdict rule applied to the model output.

/// Feature table and the named-field wine sample.
#[path = "../features.rs"]
pub mod features;

/// Artifact loading plus the scaler and classifier backends.
#[path = "../artifacts/main.rs"]
pub mod artifacts;

/// Verdict and confidence derived from a prediction.
#[path = "../verdict.rs"]
pub mod verdict;

/// Inference request handler.
#[path = "../service.rs"]
pub mod service;

/// TOML configuration document.
#[path = "../config.rs"]
pub mod config;

/// Telemetry helpers for logging/event emission.
#[path = "../telemetry.rs"]
pub mod telemetry;

pub use artifacts::{
    classifier::{BinaryClassifier, ClassifierArtifact, LogisticRegression, RandomForest},
    load_artifacts, load_classifier, load_scaler,
    scaler::{FeatureScaler, MinMaxScaler, ScalerArtifact, StandardScaler},
    ArtifactError, InferenceError, LoadedArtifacts,
};
pub use config::{QualityConfig, ServerSettings};
pub use features::{FeatureField, InputError, WineSample, FEATURE_COUNT, FEATURE_FIELDS};
pub use service::{PredictionError, QualityService};
pub use telemetry::{QualityTelemetry, QualityTelemetryBuilder};
pub use verdict::{Quality, Verdict};
