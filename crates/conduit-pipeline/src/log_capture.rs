//! Collects the log entries emitted on the current thread during a test.

use std::sync::Arc;

use conduit_logging::entry::LogEntry;
use conduit_logging::layer::WorkerLayer;
use conduit_logging::sink::{MemorySink, spawn_sink_worker};
use conduit_logging::worker::BackgroundWorker;
use conduit_test_support::FixedClock;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;

pub(crate) struct LogCapture {
    sink: MemorySink,
    worker: Arc<BackgroundWorker<LogEntry>>,
    guard: DefaultGuard,
}

impl LogCapture {
    /// Routes this thread's events into memory until [`LogCapture::finish`].
    pub(crate) fn start() -> Self {
        let sink = MemorySink::new();
        let worker = Arc::new(spawn_sink_worker(sink.clone(), 256, |_| {}).unwrap());
        let layer = WorkerLayer::new(Arc::clone(&worker), Arc::new(FixedClock::default()));
        let guard = tracing::subscriber::set_default(Registry::default().with(layer));
        Self {
            sink,
            worker,
            guard,
        }
    }

    /// Stops capturing and returns the entries logged with `message`.
    pub(crate) fn finish(self, message: &str) -> Vec<LogEntry> {
        drop(self.guard);
        self.worker.shutdown();
        self.sink
            .entries()
            .into_iter()
            .filter(|entry| entry.message == message)
            .collect()
    }
}
