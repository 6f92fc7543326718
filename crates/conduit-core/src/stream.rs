//! Single-pass event stream with explicit reset.

use std::collections::VecDeque;

use thiserror::Error;

/// Errors raised by [`EventStream`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// `current` was read before the first `advance` or after exhaustion.
    #[error("event stream has no current element")]
    BadState,
}

/// A destructive queue over a fixed collection of events.
///
/// Taking elements removes them; `reset` restores the original collection.
#[derive(Debug, Clone)]
pub struct EventStream<T: Clone> {
    source: Vec<T>,
    remaining: VecDeque<T>,
    current: Option<T>,
}

impl<T: Clone> EventStream<T> {
    /// Creates a stream over `events`.
    #[must_use]
    pub fn new(events: Vec<T>) -> Self {
        let remaining = events.iter().cloned().collect();
        Self {
            source: events,
            remaining,
            current: None,
        }
    }

    /// Removes and returns everything not yet taken.
    pub fn take_all(&mut self) -> Vec<T> {
        self.current = None;
        self.remaining.drain(..).collect()
    }

    /// Moves to the next element, removing it from the stream.
    ///
    /// Returns `false` once the stream is exhausted.
    pub fn advance(&mut self) -> bool {
        self.current = self.remaining.pop_front();
        self.current.is_some()
    }

    /// The element the last `advance` moved to.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::BadState`] before the first `advance` and after
    /// the stream is exhausted.
    pub fn current(&self) -> Result<&T, StreamError> {
        self.current.as_ref().ok_or(StreamError::BadState)
    }

    /// Restores the original collection.
    pub fn reset(&mut self) {
        self.remaining = self.source.iter().cloned().collect();
        self.current = None;
    }

    /// Number of elements not yet taken.
    #[must_use]
    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    /// Returns `true` when every element has been taken.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }
}
