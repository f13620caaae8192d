use std::fmt;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::{Directive, LevelFilter},
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter,
};

use super::context::current_request_id;
use crate::error::{AppError, Result};

/// Targets that are held at `warn` regardless of the configured level.
pub const NOISY_TARGETS: &[&str] = &["sqlx::query", "sqlx::pool"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Configuration for logging.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub app_name: String,
    pub environment: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            app_name: "probe-service".to_string(),
            environment: "development".to_string(),
        }
    }
}

impl LogConfig {
    pub fn from_settings(settings: &crate::config::ApplicationSettings) -> Self {
        Self {
            level: settings.log_level.clone(),
            app_name: settings.name.clone(),
            environment: settings.environment.clone(),
        }
    }

    /// Builds the level filter: the global threshold plus the noisy-target overrides.
    pub fn env_filter(&self) -> Result<EnvFilter> {
        let level = match self.level.to_lowercase().as_str() {
            "warning" => "warn".to_string(),
            "critical" | "fatal" => "error".to_string(),
            other => other.to_string(),
        };
        let level: LevelFilter = level
            .parse()
            .map_err(|_| AppError::Config(format!("invalid log level {:?}", self.level)))?;

        let mut filter = EnvFilter::default().add_directive(level.into());
        for target in NOISY_TARGETS {
            let directive: Directive = format!("{target}=warn")
                .parse()
                .map_err(|e| AppError::Config(format!("invalid directive for {target}: {e}")))?;
            filter = filter.add_directive(directive);
        }

        Ok(filter)
    }
}

/// Formats each event as one flat JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonLogFormatter {
    app_name: String,
    environment: String,
}

impl JsonLogFormatter {
    pub fn new(app_name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            environment: environment.into(),
        }
    }

    fn record(&self, event: &Event<'_>) -> Map<String, Value> {
        let metadata = event.metadata();
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let mut record = Map::new();
        record.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().format(TIMESTAMP_FORMAT).to_string()),
        );
        record.insert("level".to_string(), Value::String(metadata.level().to_string()));
        record.insert("name".to_string(), Value::String(metadata.target().to_string()));
        record.insert(
            "message".to_string(),
            Value::String(visitor.message.unwrap_or_default()),
        );
        record.insert("app".to_string(), Value::String(self.app_name.clone()));
        record.insert(
            "environment".to_string(),
            Value::String(self.environment.clone()),
        );
        if let Some(request_id) = current_request_id() {
            record.insert("request_id".to_string(), Value::String(request_id));
        }
        if let Some(exception) = visitor.exception {
            record.insert("exception".to_string(), Value::String(exception));
        }
        for (key, value) in visitor.fields {
            record.entry(key).or_insert(value);
        }

        record
    }
}

impl<S, N> FormatEvent<S, N> for JsonLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let line = serde_json::to_string(&self.record(event)).map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

#[derive(Default)]
struct JsonVisitor {
    message: Option<String>,
    exception: Option<String>,
    fields: Map<String, Value>,
}

impl JsonVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => {
                self.message = Some(match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
            }
            "exception" => {
                self.exception = Some(match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
            }
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for JsonVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.insert(field, value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }
}

/// Builds the JSON logging subscriber writing to `writer`.
pub fn build_subscriber<W>(config: &LogConfig, writer: W) -> Result<impl Subscriber + Send + Sync>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let fmt_layer = tracing_subscriber::fmt::layer()
        .event_format(JsonLogFormatter::new(&config.app_name, &config.environment))
        .with_writer(writer);

    Ok(tracing_subscriber::registry()
        .with(config.env_filter()?)
        .with(fmt_layer))
}

/// Installs the process-wide JSON logger on standard output.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    build_subscriber(config, std::io::stdout)?
        .try_init()
        .map_err(|e| AppError::Config(format!("logging already initialized: {e}")))?;

    tracing::info!(
        "Logging configured with level {} for {} in {} environment",
        config.level,
        config.app_name,
        config.environment
    );
    Ok(())
}
