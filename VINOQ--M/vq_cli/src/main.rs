use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;
use tokio::runtime::Runtime;
use vinoq_form_server::{serve, AppState};
use vinoq_quality::{
    InputError, QualityConfig, QualityService, QualityTelemetry, WineSample, FEATURE_FIELDS,
};

#[derive(Parser, Debug)]
#[command(name = "vq", version, about = "Wine quality prediction from chemical measurements")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Predicts the quality of one sample; unset measurements take the form defaults.
    Predict(PredictArgs),
    /// Prints the input field table.
    Fields {
        /// Emits the table as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Loads both artifacts and reports their kinds.
    Check(ConfigArgs),
    /// Serves the prediction form over HTTP.
    Serve {
        #[command(flatten)]
        config: ConfigArgs,
        /// Overrides `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// TOML configuration; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the classifier artifact path.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Overrides the scaler artifact path.
    #[arg(long)]
    scaler: Option<PathBuf>,
    /// Overrides `log_level` (debug, info, warn, error).
    #[arg(long)]
    log_level: Option<LogLevel>,
    /// Disables stderr logging when no log file is configured.
    #[arg(long)]
    quiet: bool,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<QualityConfig> {
        let mut config = QualityConfig::load_or_default(self.config.as_deref())?;
        if let Some(model) = &self.model {
            config.model_path.clone_from(model);
        }
        if let Some(scaler) = &self.scaler {
            config.scaler_path.clone_from(scaler);
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        Ok(config)
    }

    fn telemetry(&self, config: &QualityConfig) -> Result<QualityTelemetry> {
        let mut builder = QualityTelemetry::builder("vq")
            .min_level(config.log_level)
            .stderr(!self.quiet);
        if let Some(path) = &config.log_path {
            builder = builder.log_path(path.clone());
        }
        if let Some(path) = &config.event_log {
            let publisher = FileEventPublisher::new(path)
                .with_context(|| format!("opening event log {}", path.display()))?;
            builder = builder.event_publisher(Arc::new(publisher));
        }
        builder.build()
    }

    fn load_service(&self) -> Result<(QualityConfig, QualityService)> {
        let config = self.resolve()?;
        let telemetry = self.telemetry(&config)?;
        let service =
            QualityService::load(&config, telemetry).context("loading model artifacts")?;
        Ok((config, service))
    }
}

#[derive(Args, Debug)]
struct PredictArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// g(tartaric acid)/dm³.
    #[arg(long)]
    fixed_acidity: Option<f64>,
    /// g(acetic acid)/dm³.
    #[arg(long)]
    volatile_acidity: Option<f64>,
    /// g/dm³.
    #[arg(long)]
    citric_acid: Option<f64>,
    /// g/dm³.
    #[arg(long)]
    residual_sugar: Option<f64>,
    /// g(sodium chloride)/dm³.
    #[arg(long)]
    chlorides: Option<f64>,
    /// mg/dm³.
    #[arg(long)]
    free_sulfur_dioxide: Option<f64>,
    /// mg/dm³.
    #[arg(long)]
    total_sulfur_dioxide: Option<f64>,
    /// g/cm³.
    #[arg(long)]
    density: Option<f64>,
    #[arg(long)]
    ph: Option<f64>,
    /// g(potassium sulphate)/dm³.
    #[arg(long)]
    sulphates: Option<f64>,
    /// % vol.
    #[arg(long)]
    alcohol: Option<f64>,
    /// Prints the verdict as JSON.
    #[arg(long)]
    json: bool,
}

impl PredictArgs {
    fn sample(&self) -> Result<WineSample, InputError> {
        let overrides = [
            ("fixed_acidity", self.fixed_acidity),
            ("volatile_acidity", self.volatile_acidity),
            ("citric_acid", self.citric_acid),
            ("residual_sugar", self.residual_sugar),
            ("chlorides", self.chlorides),
            ("free_sulfur_dioxide", self.free_sulfur_dioxide),
            ("total_sulfur_dioxide", self.total_sulfur_dioxide),
            ("density", self.density),
            ("ph", self.ph),
            ("sulphates", self.sulphates),
            ("alcohol", self.alcohol),
        ];
        let mut sample = WineSample::default();
        for (name, value) in overrides {
            if let Some(value) = value {
                sample.set(name, value)?;
            }
        }
        Ok(sample)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Predict(args) => handle_predict(&args),
        Commands::Fields { json } => handle_fields(json),
        Commands::Check(args) => handle_check(&args),
        Commands::Serve { config, bind } => handle_serve(&config, bind),
    }
}

fn handle_predict(args: &PredictArgs) -> Result<()> {
    let sample = args.sample().context("invalid input")?;
    let (_, service) = args.config.load_service()?;
    let verdict = service.predict(&sample)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        println!("{verdict}");
        println!("{}", verdict.remark());
    }
    Ok(())
}

fn handle_fields(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&FEATURE_FIELDS)?);
        return Ok(());
    }
    println!(
        "{:<22} {:<22} {:>8} {:>8} {:>8} {:>8}",
        "name", "label", "min", "max", "default", "step"
    );
    for field in &FEATURE_FIELDS {
        println!(
            "{:<22} {:<22} {:>8} {:>8} {:>8} {:>8}",
            field.name, field.label, field.min, field.max, field.default, field.step
        );
    }
    Ok(())
}

fn handle_check(args: &ConfigArgs) -> Result<()> {
    let (config, service) = args.load_service()?;
    println!(
        "model  {} ({})",
        service.classifier_kind(),
        config.model_path.display()
    );
    println!(
        "scaler {} ({})",
        service.scaler_kind(),
        config.scaler_path.display()
    );
    Ok(())
}

fn handle_serve(args: &ConfigArgs, bind: Option<String>) -> Result<()> {
    // artifacts load before any socket is bound
    let (config, service) = args.load_service()?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let _ = service.telemetry().log(
        LogLevel::Info,
        "serve_requested",
        json!({ "bind": bind, "strict_inputs": service.strict_inputs() }),
    );
    let state = AppState::from_config(&config, service);
    let runtime = Runtime::new().context("starting tokio runtime")?;
    runtime.block_on(serve(state, &bind))
}
