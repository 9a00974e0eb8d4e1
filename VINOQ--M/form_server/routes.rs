use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::json;
use shared_logging::LogLevel;
use vinoq_quality::{PredictionError, QualityConfig, QualityService, WineSample};

use crate::page::{self, FormValues, Outcome, PageSettings};

/// Banner image kept in memory for `/banner`.
#[derive(Debug)]
pub struct Banner {
    bytes: Vec<u8>,
    content_type: &'static str,
}

impl Banner {
    /// Reads the image; `None` when the file is absent or unreadable.
    #[must_use]
    pub fn read(path: &Path) -> Option<Self> {
        let bytes = fs::read(path).ok()?;
        let content_type = match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("png") => "image/png",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            _ => "application/octet-stream",
        };
        Some(Self {
            bytes,
            content_type,
        })
    }
}

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    service: Arc<QualityService>,
    page: Arc<PageSettings>,
    banner: Option<Arc<Banner>>,
}

impl AppState {
    /// State without a banner.
    #[must_use]
    pub fn new(service: QualityService, title: impl Into<String>) -> Self {
        Self {
            service: Arc::new(service),
            page: Arc::new(PageSettings {
                title: title.into(),
                banner: false,
            }),
            banner: None,
        }
    }

    /// Attaches a banner image, if one could be read.
    #[must_use]
    pub fn with_banner(mut self, banner: Option<Banner>) -> Self {
        let mut page = (*self.page).clone();
        page.banner = banner.is_some();
        self.page = Arc::new(page);
        self.banner = banner.map(Arc::new);
        self
    }

    /// State for a configuration whose artifacts are already loaded into `service`.
    #[must_use]
    pub fn from_config(config: &QualityConfig, service: QualityService) -> Self {
        let banner = config.banner_path.as_deref().and_then(Banner::read);
        if banner.is_none() {
            let _ = service.telemetry().log(
                LogLevel::Debug,
                "banner_skipped",
                json!({ "banner_path": config.banner_path }),
            );
        }
        Self::new(service, config.server.title.clone()).with_banner(banner)
    }

    /// Inference service behind the form.
    #[must_use]
    pub fn service(&self) -> &QualityService {
        &self.service
    }
}

/// Builds the form router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(form_handler))
        .route("/predict", post(predict_handler))
        .route("/banner", get(banner_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Binds `bind` and serves the form until Ctrl-C, then drains pending events.
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    let addr = listener.local_addr().context("reading bound address")?;
    let telemetry = state.service.telemetry().clone();
    let _ = telemetry.log(
        LogLevel::Info,
        "form_server_listening",
        json!({
            "addr": addr.to_string(),
            "model": state.service.classifier_kind(),
            "scaler": state.service.scaler_kind(),
        }),
    );
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving form")?;
    telemetry.flush().await;
    let _ = telemetry.log(LogLevel::Info, "form_server_stopped", json!({}));
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn form_handler(State(state): State<AppState>) -> Html<String> {
    Html(page::render(&state.page, &FormValues::default(), None))
}

async fn predict_handler(
    State(state): State<AppState>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> (StatusCode, Html<String>) {
    let values = FormValues::from_pairs(&pairs);
    let parsed = WineSample::from_pairs(
        pairs
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str())),
    );
    let (status, outcome) = match parsed {
        Err(err) => {
            let _ = state.service.telemetry().log(
                LogLevel::Warn,
                "form_rejected",
                json!({ "field": err.field() }),
            );
            (StatusCode::UNPROCESSABLE_ENTITY, Outcome::Rejected(err))
        }
        Ok(sample) => match state.service.predict(&sample) {
            Ok(verdict) => (StatusCode::OK, Outcome::Verdict(verdict)),
            Err(PredictionError::Input(err)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Outcome::Rejected(err))
            }
            Err(PredictionError::Inference(err)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Outcome::Failed(err.to_string()),
            ),
        },
    };
    (status, Html(page::render(&state.page, &values, Some(&outcome))))
}

async fn banner_handler(State(state): State<AppState>) -> Response {
    match &state.banner {
        Some(banner) => (
            [(header::CONTENT_TYPE, banner.content_type)],
            banner.bytes.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "model": state.service.classifier_kind(),
        "scaler": state.service.scaler_kind(),
    }))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use ndarray::{Array1, Array2};
    use tempfile::tempdir;
    use tower::util::ServiceExt;
    use vinoq_quality::{
        BinaryClassifier, InferenceError, StandardScaler, FEATURE_COUNT, FEATURE_FIELDS,
    };

    use super::*;

    fn bundled_config() -> QualityConfig {
        QualityConfig::in_dir(
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../quality/artifacts"),
        )
    }

    fn test_app() -> Router {
        let config = bundled_config();
        let service =
            QualityService::load(&config, vinoq_quality::QualityTelemetry::disabled()).unwrap();
        create_router(AppState::new(service, "AI Wine Quality Prediction"))
    }

    fn form_body(overrides: &[(&str, &str)]) -> String {
        FEATURE_FIELDS
            .iter()
            .map(|field| {
                let value = overrides
                    .iter()
                    .find(|(name, _)| *name == field.name)
                    .map_or_else(|| field.default.to_string(), |(_, value)| (*value).to_string());
                format!("{}={}", field.name, value)
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    async fn post_form(app: Router, body: String) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/predict")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn fetch(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn form_page_has_every_input() {
        let response = fetch(test_app(), "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("<h1>AI Wine Quality Prediction</h1>"));
        assert_eq!(html.matches("<input ").count(), FEATURE_FIELDS.len());
        assert!(html.contains("Predict Wine Quality"));
    }

    #[tokio::test]
    async fn default_submission_is_low_quality() {
        let (status, html) = post_form(test_app(), form_body(&[])).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<b>Low Quality</b> (Confidence: 86.39%)"));
    }

    #[tokio::test]
    async fn rich_sample_is_good_quality() {
        let body = form_body(&[
            ("fixed_acidity", "8.3"),
            ("volatile_acidity", "0.3"),
            ("citric_acid", "0.4"),
            ("residual_sugar", "2.5"),
            ("chlorides", "0.06"),
            ("free_sulfur_dioxide", "10"),
            ("total_sulfur_dioxide", "20"),
            ("density", "0.995"),
            ("ph", "3.3"),
            ("sulphates", "0.8"),
            ("alcohol", "13.0"),
        ]);
        let (status, html) = post_form(test_app(), body).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<b>Good Quality</b>"));
        assert!(html.contains("Cheers! This is a high-quality wine"));
    }

    #[tokio::test]
    async fn out_of_range_value_is_unprocessable() {
        let (status, html) = post_form(test_app(), form_body(&[("ph", "9")])).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(html.contains("Please check <b>pH</b>"));
        assert!(html.contains("value=\"9\""));
        assert!(!html.contains("Confidence"));
    }

    #[tokio::test]
    async fn hundredths_between_coarse_marks_are_accepted() {
        let body = form_body(&[
            ("alcohol", "9.55"),
            ("residual_sugar", "2.05"),
            ("free_sulfur_dioxide", "5.5"),
            ("fixed_acidity", "7.45"),
        ]);
        let (status, html) = post_form(test_app(), body).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("(Confidence: "));
        assert!(html.contains("value=\"9.55\""));
    }

    #[tokio::test]
    async fn missing_field_is_unprocessable() {
        let (status, html) = post_form(test_app(), "alcohol=10".to_string()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(html.contains("fixed_acidity is required"));
    }

    /// Returns a label the decision rule cannot map.
    #[derive(Debug)]
    struct BrokenClassifier;

    impl BinaryClassifier for BrokenClassifier {
        fn kind(&self) -> &'static str {
            "broken"
        }

        fn n_features(&self) -> usize {
            FEATURE_COUNT
        }

        fn predict(&self, rows: &Array2<f64>) -> Result<Array1<u8>, InferenceError> {
            Ok(Array1::from_elem(rows.nrows(), 3))
        }

        fn predict_proba(&self, rows: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
            Ok(Array2::from_elem((rows.nrows(), 2), 0.5))
        }
    }

    #[tokio::test]
    async fn inference_failure_is_server_error() {
        let scaler =
            StandardScaler::new(vec![0.0; FEATURE_COUNT], vec![1.0; FEATURE_COUNT]).unwrap();
        let service = QualityService::new(Arc::new(scaler), Arc::new(BrokenClassifier));
        let app = create_router(AppState::new(service, "Wine"));
        let (status, html) = post_form(app, form_body(&[])).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(html.contains("Prediction failed."));
    }

    #[tokio::test]
    async fn banner_served_when_present() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wine.jpg");
        fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        let service = QualityService::load(
            &bundled_config(),
            vinoq_quality::QualityTelemetry::disabled(),
        )
        .unwrap();
        let app = create_router(AppState::new(service, "Wine").with_banner(Banner::read(&path)));

        let response = fetch(app.clone(), "/banner").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.as_ref(), &[0xFF, 0xD8, 0xFF, 0xE0]);

        let page = fetch(app, "/").await;
        let body = axum::body::to_bytes(page.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8(body.to_vec()).unwrap().contains("src=\"/banner\""));
    }

    #[tokio::test]
    async fn missing_banner_is_skipped() {
        let dir = tempdir().unwrap();
        let mut config = bundled_config();
        config.banner_path = Some(dir.path().join("absent.jpg"));
        let service =
            QualityService::load(&config, vinoq_quality::QualityTelemetry::disabled()).unwrap();
        let app = create_router(AppState::from_config(&config, service));
        let response = fetch(app, "/banner").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_artifact_kinds() {
        let response = fetch(test_app(), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["model"], "logistic_regression");
        assert_eq!(health["scaler"], "standard");
    }
}
