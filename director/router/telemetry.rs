use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};
use tokio::runtime::{Builder, Handle};
use uuid::Uuid;

use crate::command::DirectiveId;

/// Builder configuring router telemetry sinks.
pub struct DirectorTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    log_sink: Option<Arc<dyn LogSink>>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl DirectorTelemetryBuilder {
    /// Creates a new builder for the given module label.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            log_sink: None,
            event_publisher: None,
        }
    }

    /// Writes JSON log lines to `path`.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Sends log records to an existing sink. Takes precedence over
    /// [`DirectorTelemetryBuilder::log_path`].
    #[must_use]
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Registers the event publisher receiving lifecycle events.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Finalizes the builder, opening the log file if one was configured.
    pub fn build(self) -> Result<DirectorTelemetry> {
        let logger = match (self.log_sink, self.log_path) {
            (Some(sink), _) => Some(sink),
            (None, Some(path)) => Some(Arc::new(JsonLogger::new(path)?) as Arc<dyn LogSink>),
            (None, None) => None,
        };
        Ok(DirectorTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Telemetry handle shared by the router and its spawned completions.
#[derive(Clone)]
pub struct DirectorTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for DirectorTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorTelemetry")
            .field("module", &self.inner.module)
            .field("logger", &self.inner.logger.is_some())
            .field("events", &self.inner.publisher.is_some())
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<Arc<dyn LogSink>>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl DirectorTelemetry {
    /// Returns a builder for this telemetry helper.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> DirectorTelemetryBuilder {
        DirectorTelemetryBuilder::new(module)
    }

    /// Logs a structured record.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        self.write(None, level, message, metadata)
    }

    /// Logs a structured record attributed to one directive.
    pub fn log_for(
        &self,
        directive: DirectiveId,
        level: LogLevel,
        message: &str,
        metadata: Value,
    ) -> Result<()> {
        self.write(Some(directive), level, message, metadata)
    }

    /// Emits an event on the configured bus.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        self.emit(None, event_type, payload)
    }

    /// Emits an event attributed to one directive.
    pub fn event_for(&self, directive: DirectiveId, event_type: &str, payload: Value) -> Result<()> {
        self.emit(Some(directive), event_type, payload)
    }

    fn write(
        &self,
        directive: Option<DirectiveId>,
        level: LogLevel,
        message: &str,
        metadata: Value,
    ) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let mut record = LogRecord::new(&self.inner.module, level, message).with_fields(metadata);
            if let Some(directive) = directive {
                record = record.with_directive(directive.get());
            }
            logger.log(&record)?;
        }
        Ok(())
    }

    fn emit(&self, directive: Option<DirectiveId>, event_type: &str, payload: Value) -> Result<()> {
        let Some(publisher) = &self.inner.publisher else {
            return Ok(());
        };
        let record = EventRecord {
            id: format!("evt-{}", Uuid::new_v4()),
            source: self.inner.module.clone(),
            event_type: event_type.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            directive: directive.map(DirectiveId::get),
            payload,
        };
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(publisher);
            handle.spawn(async move {
                if let Err(err) = publisher.publish(record).await {
                    tracing::warn!(error = %err, "telemetry event publish failed");
                }
            });
            Ok(())
        } else {
            Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(publisher.publish(record))
        }
    }
}
