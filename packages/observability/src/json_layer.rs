//! JSON-lines layer for structured logging.
//!
//! One object per event with:
//! - timestamp (RFC 3339, microseconds)
//! - level, service, pid, target, message
//! - command_id / kind hoisted to the top level when present, so delivery
//!   logs can be followed with `jq 'select(.command_id == 7)'`
//! - remaining structured fields under `fields`

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Field names lifted out of `fields`.
const COMMAND_ID_FIELD: &str = "command_id";
const KIND_FIELD: &str = "kind";

/// A single structured log line.
#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub timestamp: String,
    pub level: &'static str,
    pub service: String,
    pub pid: u32,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    command_id: Option<u64>,
    kind: Option<String>,
    fields: BTreeMap<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        match (field.name(), &value) {
            ("message", _) => {
                self.message = Some(match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                });
            }
            (COMMAND_ID_FIELD, Value::Number(n)) if n.as_u64().is_some() => {
                self.command_id = n.as_u64();
            }
            (KIND_FIELD, Value::String(s)) => self.kind = Some(s.clone()),
            (name, _) => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.insert(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }
}

/// Layer writing one JSON object per event.
pub struct JsonLayer<W> {
    service_name: String,
    pid: u32,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service_name: String, make_writer: W) -> Self {
        Self {
            service_name,
            pid: std::process::id(),
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let line = LogLine {
            timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            level: level_name(*metadata.level()),
            service: self.service_name.clone(),
            pid: self.pid,
            target: metadata.target().to_string(),
            message: visitor.message.unwrap_or_default(),
            command_id: visitor.command_id,
            kind: visitor.kind,
            fields: visitor.fields,
            span: ctx.event_span(event).map(|s| s.name().to_string()),
        };

        if let Ok(json) = serde_json::to_string(&line) {
            let mut writer = self.make_writer.make_writer();
            let _ = writeln!(writer, "{json}");
        }
    }
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARN",
        Level::ERROR => "ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture_lines(f: impl FnOnce()) -> Vec<Value> {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::registry()
            .with(JsonLayer::new("heapchat-test".to_string(), capture.clone()));
        tracing::subscriber::with_default(subscriber, f);

        let bytes = capture.0.lock().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_log_line_hoists_command_fields() {
        let lines = capture_lines(|| {
            tracing::warn!(command_id = 7u64, kind = "LOGIN", attempt = 1u32, "Send failed, retrying");
        });

        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["service"], "heapchat-test");
        assert_eq!(line["message"], "Send failed, retrying");
        assert_eq!(line["command_id"], 7);
        assert_eq!(line["kind"], "LOGIN");
        assert_eq!(line["fields"]["attempt"], 1);
    }

    #[test]
    fn test_log_line_without_command_fields_omits_them() {
        let lines = capture_lines(|| {
            tracing::info!(queued = 0u64, "Transport ready");
        });

        let line = lines[0].as_object().unwrap();
        assert!(!line.contains_key("command_id"));
        assert!(!line.contains_key("kind"));
        assert_eq!(line["fields"]["queued"], 0);
    }

    #[test]
    fn test_log_line_serialization() {
        let line = LogLine {
            timestamp: "2026-01-15T10:30:00.000000Z".to_string(),
            level: "INFO",
            service: "heapchat-sim".to_string(),
            pid: 12345,
            target: "heapchat_outbox::channel".to_string(),
            message: "Command delivered".to_string(),
            command_id: Some(3),
            kind: Some("INIT".to_string()),
            fields: BTreeMap::new(),
            span: None,
        };

        let json = serde_json::to_string(&line).unwrap();
        assert!(json.contains("\"service\":\"heapchat-sim\""));
        assert!(json.contains("\"command_id\":3"));
        assert!(!json.contains("\"fields\""));
    }
}
