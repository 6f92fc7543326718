//! Aggregate root abstraction.

use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::event::{DomainEvent, SharedEvent};

/// Trait for entities that own a queue of not-yet-published events.
pub trait AggregateRoot: Send + Sync {
    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the queue of pending events.
    fn events(&self) -> &EventQueue;
}

/// Append-only list of pending domain events.
///
/// Interior mutability lets event handlers append to an aggregate while a
/// unit of work is draining it.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: Mutex<Vec<SharedEvent>>,
}

impl EventQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and returns the shared handle to it.
    pub fn add<E: DomainEvent>(&self, event: E) -> SharedEvent {
        let event: SharedEvent = Arc::new(event);
        self.add_shared(Arc::clone(&event));
        event
    }

    /// Appends an already shared event.
    pub fn add_shared(&self, event: SharedEvent) {
        self.pending.lock().push(event);
    }

    /// Snapshot of the pending events, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<SharedEvent> {
        self.pending.lock().clone()
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns `true` when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Discards every pending event.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    /// Removes the `count` oldest events after they were handed to a publisher.
    ///
    /// Events appended while those were being published stay queued.
    pub fn acknowledge(&self, count: usize) {
        let mut pending = self.pending.lock();
        let count = count.min(pending.len());
        pending.drain(..count);
    }
}
