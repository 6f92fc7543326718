//! Bounded producer/consumer queue drained by one dedicated thread.
//!
//! Producers never block: when the queue is full or the worker has stopped
//! the item is handed to the rejection callback instead.

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use thiserror::Error;

/// Why an item was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The queue was at capacity.
    #[error("queue is full")]
    Full,
    /// The worker was shut down.
    #[error("worker has stopped")]
    Closed,
}

type RejectFn<T> = Arc<dyn Fn(T, Rejection) + Send + Sync>;

/// A single consumer thread fed through a bounded queue.
pub struct BackgroundWorker<T> {
    sender: Mutex<Option<SyncSender<T>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    on_rejected: RejectFn<T>,
}

impl<T: Send + 'static> BackgroundWorker<T> {
    /// Starts a thread named `name` running `consume` on every queued item.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn spawn(
        name: &str,
        capacity: usize,
        mut consume: impl FnMut(T) + Send + 'static,
        on_rejected: impl Fn(T, Rejection) + Send + Sync + 'static,
    ) -> io::Result<Self> {
        assert!(capacity > 0, "a background worker needs a queue capacity");
        let (sender, receiver) = mpsc::sync_channel::<T>(capacity);
        let handle = thread::Builder::new().name(name.to_owned()).spawn(move || {
            for item in receiver {
                consume(item);
            }
        })?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
            on_rejected: Arc::new(on_rejected),
        })
    }

    /// Queues `item` without blocking.
    pub fn enqueue(&self, item: T) {
        let sender = self.sender.lock().clone();
        let outcome = match sender {
            Some(sender) => sender.try_send(item),
            None => Err(TrySendError::Disconnected(item)),
        };
        match outcome {
            Ok(()) => {}
            Err(TrySendError::Full(item)) => (self.on_rejected)(item, Rejection::Full),
            Err(TrySendError::Disconnected(item)) => (self.on_rejected)(item, Rejection::Closed),
        }
    }

    /// Closes the queue and waits for queued items to be consumed.
    ///
    /// Later calls to [`BackgroundWorker::enqueue`] are rejected as
    /// [`Rejection::Closed`]. Calling this more than once is harmless.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        if let Some(handle) = self.handle.lock().take() {
            // A panicking consumer has already lost its items.
            let _ = handle.join();
        }
    }
}

impl<T> Drop for BackgroundWorker<T> {
    fn drop(&mut self) {
        drop(self.sender.get_mut().take());
        if let Some(handle) = self.handle.get_mut().take() {
            let _ = handle.join();
        }
    }
}

impl<T> std::fmt::Debug for BackgroundWorker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundWorker")
            .field("running", &self.sender.lock().is_some())
            .finish_non_exhaustive()
    }
}
