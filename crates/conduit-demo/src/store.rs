//! In-memory order persistence.
//!
//! The store doubles as the change set of the unit of work currently open
//! on it. Orders created by a handler are staged until the unit of work
//! saves them; discarding removes everything the session wrote. Sessions
//! are opened one at a time.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::aggregate::AggregateRoot;
use conduit_core::error::PipelineError;
use conduit_core::unit_of_work::{ChangeSet, SessionSource};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::domain::aggregates::Order;

/// Saved orders plus the writes of the open session.
#[derive(Debug, Default)]
pub struct OrderStore {
    saved: Mutex<HashMap<Uuid, Arc<Order>>>,
    staged: Mutex<Vec<Arc<Order>>>,
    written: Mutex<Vec<Uuid>>,
}

impl OrderStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a new order for the open session.
    pub fn add(&self, order: Arc<Order>) {
        self.staged.lock().push(order);
    }

    /// Loads a saved order.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Arc<Order>> {
        self.saved.lock().get(&id).cloned()
    }

    /// Number of saved orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.saved.lock().len()
    }

    /// Returns `true` if no order has been saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.saved.lock().is_empty()
    }

    fn start_session(&self) {
        self.staged.lock().clear();
        self.written.lock().clear();
    }
}

#[async_trait]
impl ChangeSet for OrderStore {
    async fn save_changes(&self, _cancel: &CancellationToken) -> Result<(), PipelineError> {
        let staged: Vec<Arc<Order>> = self.staged.lock().drain(..).collect();
        if staged.is_empty() {
            return Ok(());
        }
        let mut saved = self.saved.lock();
        let mut written = self.written.lock();
        for order in staged {
            let id = order.aggregate_id();
            written.push(id);
            saved.insert(id, order);
        }
        debug!(saved = saved.len(), "orders saved");
        Ok(())
    }

    async fn discard_changes(&self, _cancel: &CancellationToken) -> Result<(), PipelineError> {
        self.staged.lock().clear();
        let written: Vec<Uuid> = self.written.lock().drain(..).collect();
        let mut saved = self.saved.lock();
        for id in &written {
            saved.remove(id);
        }
        debug!(discarded = written.len(), "order writes discarded");
        Ok(())
    }

    fn tracked_aggregates(&self) -> Vec<Arc<dyn AggregateRoot>> {
        let written = self.written.lock().clone();
        let saved = self.saved.lock();
        let mut tracked: Vec<Arc<dyn AggregateRoot>> = written
            .iter()
            .filter_map(|id| saved.get(id))
            .map(|order| -> Arc<dyn AggregateRoot> { order.clone() })
            .collect();
        tracked.extend(
            self.staged
                .lock()
                .iter()
                .map(|order| -> Arc<dyn AggregateRoot> { order.clone() }),
        );
        tracked
    }
}

/// Opens sessions on an [`OrderStore`].
#[derive(Debug, Clone)]
pub struct Sessions {
    store: Arc<OrderStore>,
}

impl Sessions {
    #[must_use]
    pub fn new(store: Arc<OrderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SessionSource for Sessions {
    async fn open(&self, cancel: &CancellationToken) -> Result<Arc<dyn ChangeSet>, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.store.start_session();
        Ok(self.store.clone())
    }
}
