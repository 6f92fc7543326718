//! `tracing` layer that ships events to a background worker.
//!
//! Field conventions:
//! - `severity` overrides the level-derived severity (`"critical"` is the
//!   only way to reach [`Severity::Critical`]);
//! - `error` becomes [`LogEntry::error`];
//! - every other field except `message` lands in [`LogEntry::data`].

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use conduit_core::clock::Clock;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::entry::{LogEntry, Severity};
use crate::worker::BackgroundWorker;

/// Forwards every event it sees to a [`BackgroundWorker`].
pub struct WorkerLayer {
    worker: Arc<BackgroundWorker<LogEntry>>,
    clock: Arc<dyn Clock>,
}

impl WorkerLayer {
    /// Creates a layer stamping entries with `clock`.
    #[must_use]
    pub fn new(worker: Arc<BackgroundWorker<LogEntry>>, clock: Arc<dyn Clock>) -> Self {
        Self { worker, clock }
    }
}

impl<S: Subscriber> Layer<S> for WorkerLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut fields = EntryFields::default();
        event.record(&mut fields);

        let severity = fields
            .severity
            .unwrap_or_else(|| Severity::from_level(*metadata.level()));
        let mut entry = LogEntry::new(severity, fields.message, self.clock.now());
        entry.error = fields.error;
        entry.data = fields.data;
        entry
            .data
            .insert("target".to_owned(), Value::from(metadata.target()));
        self.worker.enqueue(entry);
    }
}

#[derive(Default)]
struct EntryFields {
    message: String,
    severity: Option<Severity>,
    error: Option<String>,
    data: Map<String, Value>,
}

impl EntryFields {
    fn record_text(&mut self, field: &Field, text: String) {
        match field.name() {
            "message" => self.message = text,
            "error" => self.error = Some(text),
            "severity" => match Severity::parse(&text) {
                Some(severity) => self.severity = Some(severity),
                None => {
                    self.data.insert("severity".to_owned(), Value::String(text));
                }
            },
            name => {
                self.data.insert(name.to_owned(), Value::String(text));
            }
        }
    }
}

impl Visit for EntryFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_text(field, value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_text(field, format!("{value:?}"));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn StdError + 'static)) {
        self.record_text(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.data.insert(field.name().to_owned(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.data.insert(field.name().to_owned(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.data.insert(field.name().to_owned(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.data.insert(field.name().to_owned(), Value::from(value));
    }
}

#[cfg(test)]
mod tests {
    use conduit_test_support::FixedClock;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::registry::Registry;

    use super::*;
    use crate::sink::{MemorySink, spawn_sink_worker};

    fn capture(emit: impl FnOnce()) -> Vec<LogEntry> {
        let sink = MemorySink::new();
        let worker = Arc::new(spawn_sink_worker(sink.clone(), 16, |_| {}).unwrap());
        let layer = WorkerLayer::new(Arc::clone(&worker), Arc::new(FixedClock::default()));

        tracing::subscriber::with_default(Registry::default().with(layer), emit);
        worker.shutdown();
        sink.entries()
    }

    #[test]
    fn test_critical_field_escalates_error_event() {
        let entries = capture(|| {
            tracing::error!(
                severity = "critical",
                error = %"connection lost",
                attempt = 3_u64,
                "revert failed"
            );
        });

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.severity, Severity::Critical);
        assert_eq!(entry.message, "revert failed");
        assert_eq!(entry.error.as_deref(), Some("connection lost"));
        assert_eq!(entry.data["attempt"], 3);
        assert_eq!(entry.timestamp_utc, FixedClock::default().0);
    }

    #[test]
    fn test_levels_map_without_severity_field() {
        let entries = capture(|| {
            tracing::info!(principal = "Anonymous", "authorization denied");
            tracing::warn!("deadlock detected, retrying");
        });

        let severities: Vec<Severity> = entries.iter().map(|e| e.severity).collect();
        assert_eq!(severities, vec![Severity::Info, Severity::Warning]);
        assert_eq!(entries[0].data["principal"], "Anonymous");
        assert!(entries[0].error.is_none());
    }
}
