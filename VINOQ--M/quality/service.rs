//! Inference request handler.
//!
//! `QualityService` owns the fitted scaler and classifier behind trait objects and
//! turns one [`WineSample`] into one [`Verdict`]. It holds no mutable state, so a
//! clone can be handed to every concurrent request.

use std::sync::Arc;

use serde_json::json;
use shared_logging::LogLevel;
use thiserror::Error;

use crate::{
    artifacts::{
        classifier::BinaryClassifier, load_artifacts, scaler::FeatureScaler, ArtifactError,
        InferenceError, LoadedArtifacts,
    },
    config::QualityConfig,
    features::{InputError, WineSample},
    telemetry::QualityTelemetry,
    verdict::Verdict,
};

/// A single prediction could not be produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionError {
    /// Sample rejected by the strict input check.
    #[error("invalid input: {0}")]
    Input(#[from] InputError),
    /// Scaler or classifier failed, or returned unusable output.
    #[error("prediction failed: {0}")]
    Inference(#[from] InferenceError),
}

/// Immutable inference service injected into every surface.
#[derive(Debug, Clone)]
pub struct QualityService {
    scaler: Arc<dyn FeatureScaler>,
    classifier: Arc<dyn BinaryClassifier>,
    strict_inputs: bool,
    telemetry: QualityTelemetry,
}

impl QualityService {
    /// Wraps an already loaded scaler and classifier.
    #[must_use]
    pub fn new(scaler: Arc<dyn FeatureScaler>, classifier: Arc<dyn BinaryClassifier>) -> Self {
        Self {
            scaler,
            classifier,
            strict_inputs: false,
            telemetry: QualityTelemetry::disabled(),
        }
    }

    /// Wraps a loaded artifact pair.
    #[must_use]
    pub fn from_artifacts(artifacts: LoadedArtifacts) -> Self {
        Self::new(artifacts.scaler, artifacts.classifier)
    }

    /// Loads the artifacts named by `config`; any failure is fatal for the caller.
    pub fn load(
        config: &QualityConfig,
        telemetry: QualityTelemetry,
    ) -> Result<Self, ArtifactError> {
        let artifacts = match load_artifacts(&config.model_path, &config.scaler_path) {
            Ok(artifacts) => artifacts,
            Err(err) => {
                let _ = telemetry.log(
                    LogLevel::Error,
                    "artifact_load_failed",
                    json!({ "error": err.to_string() }),
                );
                return Err(err);
            }
        };
        let _ = telemetry.log(
            LogLevel::Info,
            "artifacts_loaded",
            json!({
                "model_path": config.model_path,
                "model": artifacts.classifier.kind(),
                "scaler_path": config.scaler_path,
                "scaler": artifacts.scaler.kind(),
                "strict_inputs": config.strict_inputs,
            }),
        );
        Ok(Self::from_artifacts(artifacts)
            .with_strict_inputs(config.strict_inputs)
            .with_telemetry(telemetry))
    }

    /// Re-validates every sample against the field bounds before inference.
    #[must_use]
    pub const fn with_strict_inputs(mut self, strict: bool) -> Self {
        self.strict_inputs = strict;
        self
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: QualityTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Kind of the loaded classifier.
    #[must_use]
    pub fn classifier_kind(&self) -> &'static str {
        self.classifier.kind()
    }

    /// Kind of the loaded scaler.
    #[must_use]
    pub fn scaler_kind(&self) -> &'static str {
        self.scaler.kind()
    }

    /// Whether samples are re-validated inside the service.
    #[must_use]
    pub const fn strict_inputs(&self) -> bool {
        self.strict_inputs
    }

    /// Telemetry handle, shared with the surfaces.
    #[must_use]
    pub const fn telemetry(&self) -> &QualityTelemetry {
        &self.telemetry
    }

    /// Scales the sample, classifies it and applies the verdict rule.
    ///
    /// `transform`, `predict` and `predict_proba` each run exactly once. Feature
    /// values never reach the logs.
    pub fn predict(&self, sample: &WineSample) -> Result<Verdict, PredictionError> {
        let outcome = self.run(sample);
        match &outcome {
            Ok(verdict) => {
                let payload = json!({
                    "verdict": verdict.headline(),
                    "label": verdict.label,
                    "confidence": verdict.confidence,
                });
                let _ = self
                    .telemetry
                    .log(LogLevel::Info, "prediction_served", payload.clone());
                let _ = self.telemetry.event("quality.prediction", payload);
            }
            Err(err) => {
                let payload = json!({ "error": err.to_string() });
                let _ = self
                    .telemetry
                    .log(LogLevel::Warn, "prediction_failed", payload.clone());
                let _ = self.telemetry.event("quality.prediction_failed", payload);
            }
        }
        outcome
    }

    fn run(&self, sample: &WineSample) -> Result<Verdict, PredictionError> {
        if self.strict_inputs {
            sample.validate()?;
        }
        let scaled = self.scaler.transform(&sample.to_row())?;
        let labels = self.classifier.predict(&scaled)?;
        let proba = self.classifier.predict_proba(&scaled)?;
        let label = labels
            .iter()
            .next()
            .copied()
            .ok_or_else(|| InferenceError::InvalidOutput("no label returned".into()))?;
        if proba.nrows() == 0 || proba.ncols() != 2 {
            return Err(InferenceError::InvalidOutput(format!(
                "probability matrix has shape {:?}, expected [1, 2]",
                proba.shape()
            ))
            .into());
        }
        Ok(Verdict::from_prediction(label, proba[[0, 1]])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        artifacts::{classifier::LogisticRegression, scaler::StandardScaler},
        features::{FEATURE_COUNT, FEATURE_FIELDS},
        verdict::Quality,
    };
    use ndarray::{Array1, Array2};
    use shared_event_bus::MemoryEventBus;
    use std::{
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use tempfile::tempdir;

    #[derive(Debug, Default)]
    struct Calls {
        transform: AtomicUsize,
        predict: AtomicUsize,
        predict_proba: AtomicUsize,
    }

    #[derive(Debug)]
    struct IdentityScaler(Arc<Calls>);

    impl FeatureScaler for IdentityScaler {
        fn kind(&self) -> &'static str {
            "identity"
        }

        fn n_features(&self) -> usize {
            FEATURE_COUNT
        }

        fn transform(&self, rows: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
            self.0.transform.fetch_add(1, Ordering::SeqCst);
            Ok(rows.clone())
        }
    }

    /// Returns a fixed label and class-1 probability.
    #[derive(Debug)]
    struct FixedClassifier {
        calls: Arc<Calls>,
        label: u8,
        p1: f64,
    }

    impl BinaryClassifier for FixedClassifier {
        fn kind(&self) -> &'static str {
            "fixed"
        }

        fn n_features(&self) -> usize {
            FEATURE_COUNT
        }

        fn predict(&self, rows: &Array2<f64>) -> Result<Array1<u8>, InferenceError> {
            self.calls.predict.fetch_add(1, Ordering::SeqCst);
            Ok(Array1::from_elem(rows.nrows(), self.label))
        }

        fn predict_proba(&self, rows: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
            self.calls.predict_proba.fetch_add(1, Ordering::SeqCst);
            Ok(Array2::from_shape_fn((rows.nrows(), 2), |(_, col)| {
                if col == 1 {
                    self.p1
                } else {
                    1.0 - self.p1
                }
            }))
        }
    }

    fn fixed_service(label: u8, p1: f64) -> (QualityService, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let service = QualityService::new(
            Arc::new(IdentityScaler(Arc::clone(&calls))),
            Arc::new(FixedClassifier {
                calls: Arc::clone(&calls),
                label,
                p1,
            }),
        );
        (service, calls)
    }

    fn bundled_config() -> QualityConfig {
        QualityConfig::in_dir(Path::new(env!("CARGO_MANIFEST_DIR")).join("artifacts"))
    }

    fn bundled_service() -> QualityService {
        QualityService::load(&bundled_config(), QualityTelemetry::disabled()).unwrap()
    }

    #[test]
    fn defaults_call_each_stage_once() {
        let (service, calls) = fixed_service(0, 0.25);
        let verdict = service.predict(&WineSample::default()).unwrap();
        assert_eq!(calls.transform.load(Ordering::SeqCst), 1);
        assert_eq!(calls.predict.load(Ordering::SeqCst), 1);
        assert_eq!(calls.predict_proba.load(Ordering::SeqCst), 1);
        assert_eq!(verdict.quality, Quality::Low);
        assert_eq!(verdict.to_string(), "Low Quality (Confidence: 75.00%)");
    }

    #[test]
    fn good_label_reports_class_one_probability() {
        let (service, _) = fixed_service(1, 0.9123);
        let verdict = service.predict(&WineSample::default()).unwrap();
        assert!(verdict.is_good());
        assert_eq!(verdict.confidence_text(), "91.23%");
    }

    #[test]
    fn bundled_model_is_deterministic() {
        let service = bundled_service();
        let first = service.predict(&WineSample::default()).unwrap();
        for _ in 0..5 {
            assert_eq!(service.predict(&WineSample::default()).unwrap(), first);
        }
        assert_eq!(first.quality, Quality::Low);
        assert_eq!(first.confidence_text(), "86.39%");
    }

    #[test]
    fn bundled_model_rates_balanced_wine_good() {
        let service = bundled_service();
        let sample = WineSample {
            fixed_acidity: 8.3,
            volatile_acidity: 0.3,
            citric_acid: 0.4,
            residual_sugar: 2.5,
            chlorides: 0.06,
            free_sulfur_dioxide: 10.0,
            total_sulfur_dioxide: 20.0,
            density: 0.995,
            ph: 3.3,
            sulphates: 0.8,
            alcohol: 13.0,
        };
        let verdict = service.predict(&sample).unwrap();
        assert!(verdict.is_good());
        assert!(verdict.confidence > 95.0);
    }

    #[test]
    fn confidence_stays_in_range_across_bounds() {
        let service = bundled_service();
        for values in [
            FEATURE_FIELDS.map(|field| field.min),
            FEATURE_FIELDS.map(|field| field.max),
            FEATURE_FIELDS.map(|field| field.default),
        ] {
            let verdict = service.predict(&WineSample::from_vector(values)).unwrap();
            assert!((0.0..=100.0).contains(&verdict.confidence));
            assert!(verdict.confidence >= 50.0);
            let expected = verdict.quality.confidence(verdict.positive_probability);
            assert!((verdict.confidence - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn missing_artifacts_abort_load() {
        let dir = tempdir().unwrap();
        let config = QualityConfig::in_dir(dir.path());
        let err = QualityService::load(&config, QualityTelemetry::disabled()).unwrap_err();
        assert!(matches!(err, ArtifactError::Missing { .. }));
    }

    #[test]
    fn strict_mode_rejects_out_of_range() {
        let (service, calls) = fixed_service(1, 0.8);
        let mut sample = WineSample::default();
        sample.alcohol = 42.0;
        // trusting mode passes the value straight through
        assert!(service.predict(&sample).is_ok());

        let service = service.with_strict_inputs(true);
        let err = service.predict(&sample).unwrap_err();
        assert!(matches!(err, PredictionError::Input(InputError::OutOfRange { .. })));
        assert_eq!(calls.transform.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unusable_output_is_a_prediction_failure() {
        let (service, _) = fixed_service(1, f64::NAN);
        let err = service.predict(&WineSample::default()).unwrap_err();
        assert!(matches!(err, PredictionError::Inference(_)));
        assert!(err.to_string().starts_with("prediction failed"));
    }

    #[test]
    fn shape_mismatch_is_reported_not_panicked() {
        let standard =
            StandardScaler::new(vec![0.0; FEATURE_COUNT], vec![1.0; FEATURE_COUNT]).unwrap();
        let scaler = Arc::new(standard);
        #[derive(Debug)]
        struct NarrowScaler(Arc<StandardScaler>);
        impl FeatureScaler for NarrowScaler {
            fn kind(&self) -> &'static str {
                "narrow"
            }
            fn n_features(&self) -> usize {
                FEATURE_COUNT
            }
            fn transform(&self, rows: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
                let scaled = self.0.transform(rows)?;
                Ok(scaled.slice(ndarray::s![.., ..5]).to_owned())
            }
        }
        let classifier = LogisticRegression::new(vec![0.1; FEATURE_COUNT], 0.0).unwrap();
        let service = QualityService::new(Arc::new(NarrowScaler(scaler)), Arc::new(classifier));
        let err = service.predict(&WineSample::default()).unwrap_err();
        assert_eq!(
            err,
            PredictionError::Inference(InferenceError::ShapeMismatch {
                expected: FEATURE_COUNT,
                found: 5
            })
        );
    }

    #[test]
    fn publishes_outcome_without_features() {
        let bus = MemoryEventBus::new(4);
        let dir = tempdir().unwrap();
        let telemetry = QualityTelemetry::builder("quality")
            .log_path(dir.path().join("quality.log"))
            .min_level(LogLevel::Debug)
            .event_publisher(Arc::new(bus.clone()))
            .build()
            .unwrap();
        let (service, _) = fixed_service(1, 0.6);
        let service = service.with_telemetry(telemetry);
        service.predict(&WineSample::default()).unwrap();
        let events = bus.snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "quality.prediction");
        assert_eq!(events[0].payload["verdict"], "Good Quality");
        let log = std::fs::read_to_string(dir.path().join("quality.log")).unwrap();
        assert!(log.contains("prediction_served"));
        assert!(!log.contains("alcohol"));
        assert!(!log.contains("fixed_acidity"));
    }
}
