//! Unit of work that publishes aggregate events on commit.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use conduit_core::aggregate::AggregateRoot;
use conduit_core::error::PipelineError;
use conduit_core::event::SharedEvent;
use conduit_core::publish::{EventPublisher, EventPublisherFactory, TriggerContext};
use conduit_core::unit_of_work::{
    ChangeSet, CommitListener, SessionSource, UnitOfWork, UnitOfWorkProvider,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Upper bound on save/publish rounds before the commit is abandoned.
pub const MAX_DRAIN_ROUNDS: usize = 64;

/// Opens [`EventDrainingUnitOfWork`]s.
pub struct EventDrainingProvider {
    sessions: Arc<dyn SessionSource>,
    publishers: Arc<dyn EventPublisherFactory>,
    listeners: Vec<Arc<dyn CommitListener>>,
}

impl EventDrainingProvider {
    /// Creates a provider.
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionSource>,
        publishers: Arc<dyn EventPublisherFactory>,
    ) -> Self {
        Self {
            sessions,
            publishers,
            listeners: Vec::new(),
        }
    }

    /// Adds a listener notified by every unit of work this provider opens.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn CommitListener>) -> Self {
        self.listeners.push(listener);
        self
    }
}

#[async_trait]
impl UnitOfWorkProvider for EventDrainingProvider {
    async fn begin(
        &self,
        trigger: &TriggerContext,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn UnitOfWork>, PipelineError> {
        let changes = self.sessions.open(cancel).await?;
        let publisher = self.publishers.create(trigger);
        Ok(Box::new(EventDrainingUnitOfWork {
            changes,
            publisher,
            listeners: self.listeners.clone(),
        }))
    }
}

/// Commits a change set, then publishes every pending aggregate event until
/// no aggregate has any left.
pub struct EventDrainingUnitOfWork {
    changes: Arc<dyn ChangeSet>,
    publisher: Arc<dyn EventPublisher>,
    listeners: Vec<Arc<dyn CommitListener>>,
}

impl EventDrainingUnitOfWork {
    /// Creates a unit of work over `changes`.
    #[must_use]
    pub fn new(
        changes: Arc<dyn ChangeSet>,
        publisher: Arc<dyn EventPublisher>,
        listeners: Vec<Arc<dyn CommitListener>>,
    ) -> Self {
        Self {
            changes,
            publisher,
            listeners,
        }
    }

    fn pending(&self) -> Vec<(Arc<dyn AggregateRoot>, Vec<SharedEvent>)> {
        self.changes
            .tracked_aggregates()
            .into_iter()
            .filter_map(|aggregate| {
                let events = aggregate.events().pending();
                (!events.is_empty()).then_some((aggregate, events))
            })
            .collect()
    }
}

#[async_trait]
impl UnitOfWork for EventDrainingUnitOfWork {
    async fn commit(&mut self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        self.changes.save_changes(cancel).await?;
        for listener in &self.listeners {
            listener.committing();
        }

        let mut rounds = 0;
        loop {
            let pending = self.pending();
            if pending.is_empty() {
                break;
            }
            rounds += 1;
            if rounds > MAX_DRAIN_ROUNDS {
                return Err(PipelineError::fault(anyhow!(
                    "aggregate events did not settle after {MAX_DRAIN_ROUNDS} rounds"
                )));
            }

            for (aggregate, events) in pending {
                for event in &events {
                    if cancel.is_cancelled() {
                        return Err(PipelineError::Cancelled);
                    }
                    self.publisher.publish(Arc::clone(event), cancel).await?;
                }
                aggregate.events().acknowledge(events.len());
                debug!(
                    aggregate_id = %aggregate.aggregate_id(),
                    published = events.len(),
                    round = rounds,
                    "aggregate events published"
                );
            }
            self.changes.save_changes(cancel).await?;
        }

        for listener in &self.listeners {
            listener.committed();
        }
        Ok(())
    }

    async fn revert(&mut self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        for aggregate in self.changes.tracked_aggregates() {
            if !aggregate.events().is_empty() {
                warn!(
                    aggregate_id = %aggregate.aggregate_id(),
                    discarded = aggregate.events().len(),
                    "discarding unpublished events"
                );
                aggregate.events().clear();
            }
        }
        self.changes.discard_changes(cancel).await
    }
}
