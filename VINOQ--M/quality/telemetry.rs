use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use tokio::{
    runtime::{Handle, Runtime},
    task::JoinSet,
};

/// Builder for quality telemetry sinks.
pub struct QualityTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    stderr: bool,
    min_level: LogLevel,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl QualityTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            stderr: false,
            min_level: LogLevel::Info,
            event_publisher: None,
        }
    }

    /// Writes JSON lines to a file.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Writes JSON lines to stderr when no log path is set.
    #[must_use]
    pub const fn stderr(mut self, enabled: bool) -> Self {
        self.stderr = enabled;
        self
    }

    /// Drops records below `level`.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<QualityTelemetry> {
        let logger = match (self.log_path, self.stderr) {
            (Some(path), _) => Some(JsonLogger::new(path)?.with_min_level(self.min_level)),
            (None, true) => Some(JsonLogger::stderr().with_min_level(self.min_level)),
            (None, false) => None,
        };
        let event = self.event_publisher.map(EventHandle::new);
        Ok(QualityTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
                event,
            }),
        })
    }
}

/// Telemetry handle shared by the service and its surfaces.
#[derive(Clone)]
pub struct QualityTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for QualityTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityTelemetry")
            .field("module", &self.inner.module)
            .field("log_path", &self.inner.logger.as_ref().and_then(JsonLogger::path))
            .field("events", &self.inner.event.is_some())
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
    event: Option<EventHandle>,
}

struct EventHandle {
    // created on first publish outside a runtime only
    runtime: OnceCell<Runtime>,
    publisher: Arc<dyn EventPublisher>,
    // publishes spawned on the caller's runtime, awaited by `flush`
    pending: Mutex<JoinSet<()>>,
}

impl EventHandle {
    fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            runtime: OnceCell::new(),
            publisher,
            pending: Mutex::new(JoinSet::new()),
        }
    }

    fn publish(&self, record: EventRecord) -> Result<()> {
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(&self.publisher);
            let mut pending = self.pending.lock();
            while pending.try_join_next().is_some() {}
            pending.spawn_on(
                async move {
                    if let Err(err) = publisher.publish(record).await {
                        eprintln!("telemetry event publish failed: {err:?}");
                    }
                },
                &handle,
            );
            Ok(())
        } else {
            let runtime = self.runtime.get_or_try_init(Runtime::new)?;
            runtime.block_on(self.publisher.publish(record))
        }
    }
}

impl QualityTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> QualityTelemetryBuilder {
        QualityTelemetryBuilder::new(module)
    }

    /// Handle that drops everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                module: String::new(),
                logger: None,
                event: None,
            }),
        }
    }

    /// Logs a message with structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let record = LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Emits an event.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(handle) = &self.inner.event {
            handle.publish(EventRecord::new(&self.inner.module, event_type, payload))?;
        }
        Ok(())
    }

    /// Waits for every event publish spawned so far on a runtime.
    pub async fn flush(&self) {
        if let Some(handle) = &self.inner.event {
            let mut pending = std::mem::replace(&mut *handle.pending.lock(), JoinSet::new());
            while pending.join_next().await.is_some() {}
        }
    }
}
