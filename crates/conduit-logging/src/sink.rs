//! Destinations for log entries.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::entry::LogEntry;
use crate::worker::{BackgroundWorker, Rejection};

/// Errors raised while writing an entry.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The destination refused the bytes.
    #[error("failed to write log entry: {0}")]
    Io(#[from] io::Error),

    /// The entry could not be rendered as JSON.
    #[error("failed to serialize log entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Receives entries on the worker thread.
pub trait LogSink: Send + 'static {
    /// Writes one entry.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the entry could not be written.
    fn write(&mut self, entry: &LogEntry) -> Result<(), SinkError>;
}

/// Writes each entry as one line of JSON.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    /// Writes to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send + 'static> LogSink for JsonLinesSink<W> {
    fn write(&mut self, entry: &LogEntry) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, entry)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps entries in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries written so far.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }
}

impl LogSink for MemorySink {
    fn write(&mut self, entry: &LogEntry) -> Result<(), SinkError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

/// An entry that never reached its sink.
#[derive(Debug)]
pub enum LogFailure {
    /// The worker queue refused the entry.
    Rejected {
        /// The refused entry.
        entry: LogEntry,
        /// Why the queue refused it.
        reason: Rejection,
    },
    /// The sink failed to write the entry.
    Sink {
        /// The entry that was being written.
        entry: LogEntry,
        /// The sink's error.
        error: SinkError,
    },
}

/// Starts a worker thread writing queued entries to `sink`.
///
/// Entries that are rejected or fail to write are passed to `report`, which
/// must not log through `tracing` itself.
///
/// # Errors
///
/// Returns the OS error if the thread cannot be spawned.
pub fn spawn_sink_worker<S: LogSink>(
    mut sink: S,
    capacity: usize,
    report: impl Fn(LogFailure) + Send + Sync + 'static,
) -> io::Result<BackgroundWorker<LogEntry>> {
    let report = Arc::new(report);
    let on_write_error = Arc::clone(&report);
    BackgroundWorker::spawn(
        "conduit-log-worker",
        capacity,
        move |entry: LogEntry| {
            if let Err(error) = sink.write(&entry) {
                on_write_error(LogFailure::Sink { entry, error });
            }
        },
        move |entry, reason| report(LogFailure::Rejected { entry, reason }),
    )
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::entry::Severity;

    struct BrokenSink;

    impl LogSink for BrokenSink {
        fn write(&mut self, _entry: &LogEntry) -> Result<(), SinkError> {
            Err(io::Error::other("disk full").into())
        }
    }

    fn entry(message: &str) -> LogEntry {
        LogEntry::new(
            Severity::Info,
            message,
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_entry() {
        let mut sink = JsonLinesSink::new(Vec::new());

        sink.write(&entry("first")).unwrap();
        sink.write(&entry("second")).unwrap();

        let text = String::from_utf8(sink.writer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("\"message\":\"second\""));
    }

    #[test]
    fn test_worker_forwards_entries_to_sink() {
        let sink = MemorySink::new();
        let worker = spawn_sink_worker(sink.clone(), 4, |_| {}).unwrap();

        worker.enqueue(entry("queued"));
        worker.shutdown();

        assert_eq!(sink.entries(), vec![entry("queued")]);
    }

    #[test]
    fn test_sink_failures_are_reported() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&failures);
        let worker = spawn_sink_worker(BrokenSink, 4, move |failure| {
            if let LogFailure::Sink { entry, error } = failure {
                seen.lock().push((entry.message, error.to_string()));
            }
        })
        .unwrap();

        worker.enqueue(entry("lost"));
        worker.shutdown();

        assert_eq!(
            *failures.lock(),
            vec![(
                "lost".to_owned(),
                "failed to write log entry: disk full".to_owned()
            )]
        );
    }
}
