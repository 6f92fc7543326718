//! Conduit Logging: structured log entries written off the request path.
//!
//! [`layer::WorkerLayer`] turns `tracing` events into [`entry::LogEntry`]
//! values and hands them to a [`worker::BackgroundWorker`], whose dedicated
//! thread forwards them to a [`sink::LogSink`].

pub mod entry;
pub mod layer;
pub mod sink;
pub mod worker;
