use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use shared_logging::LogLevel;

/// Service configuration, usually read from `vinoq.toml`.
#[derive(Debug, Clone)]
pub struct QualityConfig {
    /// Classifier artifact.
    pub model_path: PathBuf,
    /// Scaler artifact.
    pub scaler_path: PathBuf,
    /// Banner image; skipped silently when the file is absent.
    pub banner_path: Option<PathBuf>,
    /// Re-validate every sample inside the service instead of trusting the surface.
    pub strict_inputs: bool,
    /// JSON-lines log file; `None` logs to stderr.
    pub log_path: Option<PathBuf>,
    /// Minimum level written to the log.
    pub log_level: LogLevel,
    /// JSON-lines event log.
    pub event_log: Option<PathBuf>,
    /// HTTP form settings.
    pub server: ServerSettings,
}

/// HTTP form settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Page title.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            title: default_title(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct QualityConfigSerde {
    #[serde(default = "default_model_path")]
    model_path: PathBuf,
    #[serde(default = "default_scaler_path")]
    scaler_path: PathBuf,
    #[serde(default = "default_banner_path")]
    banner_path: Option<PathBuf>,
    #[serde(default)]
    strict_inputs: bool,
    #[serde(default)]
    log_path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    log_level: LogLevel,
    #[serde(default)]
    event_log: Option<PathBuf>,
    #[serde(default)]
    server: ServerSettings,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self::in_dir(".")
    }
}

impl QualityConfig {
    /// Default configuration with artifact paths relative to `dir`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            model_path: dir.join(default_model_path()),
            scaler_path: dir.join(default_scaler_path()),
            banner_path: default_banner_path().map(|banner| dir.join(banner)),
            strict_inputs: false,
            log_path: None,
            log_level: default_log_level(),
            event_log: None,
            server: ServerSettings::default(),
        }
    }

    /// Loads configuration from a TOML file; relative paths resolve against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::parse(&raw, &source_dir).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses a TOML document, resolving relative paths against `source_dir`.
    pub fn parse(raw: &str, source_dir: &Path) -> Result<Self> {
        let document: QualityConfigSerde = toml::from_str(raw)?;
        let resolve = |candidate: PathBuf| {
            if candidate.is_absolute() {
                candidate
            } else {
                source_dir.join(candidate)
            }
        };
        anyhow::ensure!(
            !document.server.bind.trim().is_empty(),
            "server.bind must not be empty"
        );
        Ok(Self {
            model_path: resolve(document.model_path),
            scaler_path: resolve(document.scaler_path),
            banner_path: document.banner_path.map(resolve),
            strict_inputs: document.strict_inputs,
            log_path: document.log_path.map(resolve),
            log_level: document.log_level,
            event_log: document.event_log.map(resolve),
            server: document.server,
        })
    }

    /// Loads `path` when given, otherwise returns defaults relative to the working directory.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}

fn default_model_path() -> PathBuf {
    PathBuf::from("wine_model.json")
}

fn default_scaler_path() -> PathBuf {
    PathBuf::from("scaler.json")
}

#[allow(clippy::unnecessary_wraps)]
fn default_banner_path() -> Option<PathBuf> {
    Some(PathBuf::from("wine.jpg"))
}

const fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_bind() -> String {
    "127.0.0.1:8501".into()
}

fn default_title() -> String {
    "AI Wine Quality Prediction".into()
}
