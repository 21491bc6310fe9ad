//! `tracing` layer feeding a [`LogFile`].

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Number, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::file::{LogFile, LogRecord};

/// Writes every event it sees as one JSON line.
#[derive(Clone)]
pub struct JsonlLayer {
    file: Arc<LogFile>,
}

impl JsonlLayer {
    pub fn new(file: LogFile) -> Self {
        Self {
            file: Arc::new(file),
        }
    }

    pub fn file(&self) -> &LogFile {
        &self.file
    }
}

impl<S> Layer<S> for JsonlLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let mut record = LogRecord::new(
            &metadata.level().as_str().to_lowercase(),
            metadata.target(),
            collector.message.unwrap_or_default(),
            Utc::now(),
        );
        record.fields = collector.fields;
        if let Some(scope) = ctx.event_scope(event) {
            record.spans = scope.from_root().map(|s| s.name().to_string()).collect();
        }

        // A failing log write must not take the app down
        let _ = self.file.append(&record);
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            self.message = Some(text);
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let mut text = String::new();
        let _ = write!(text, "{:?}", value);
        self.put(field, Value::String(text));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = Number::from_f64(value).map_or(Value::Null, Value::Number);
        self.put(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, Value::String(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::read_records;
    use tempfile::TempDir;
    use tracing_subscriber::prelude::*;

    #[test]
    fn test_events_are_written_with_fields() {
        let temp = TempDir::new().unwrap();
        let layer = JsonlLayer::new(LogFile::open(temp.path(), "test").unwrap());
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("drain");
            let _entered = span.enter();
            tracing::warn!(pending = 3, user_id = "U1", ok = false, "Queue stalled");
        });

        let records = read_records(temp.path()).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level, "warn");
        assert_eq!(record.message, "Queue stalled");
        assert_eq!(record.fields["pending"], 3);
        assert_eq!(record.fields["user_id"], "U1");
        assert_eq!(record.fields["ok"], false);
        assert_eq!(record.spans, vec!["drain"]);
    }
}
