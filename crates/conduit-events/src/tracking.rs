//! Publisher factory that records causal lineage.
//!
//! Each trigger gets its own [`TrackingEventStore`]. When an event is
//! published its outcome events are remembered; publishing one of those
//! later rewrites its causation to the event that produced it.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::clock::Clock;
use conduit_core::error::PipelineError;
use conduit_core::event::{EventKey, SharedEvent};
use conduit_core::id::{MetadataId, SequenceGenerator};
use conduit_core::publish::{EventPublisher, EventPublisherFactory, EventStore, TriggerContext};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::store::TrackingEventStore;

/// Wraps a base publisher with a fresh tracking store per trigger.
pub struct TrackingPublisherFactory {
    base: Arc<dyn EventPublisher>,
    sequence: Arc<dyn SequenceGenerator>,
    clock: Arc<dyn Clock>,
}

impl TrackingPublisherFactory {
    /// Creates a factory around `base`.
    #[must_use]
    pub fn new(
        base: Arc<dyn EventPublisher>,
        sequence: Arc<dyn SequenceGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            base,
            sequence,
            clock,
        }
    }

    /// Like [`EventPublisherFactory::create`], keeping the concrete type so
    /// the caller can read the store afterwards.
    #[must_use]
    pub fn create_tracking(&self, trigger: &TriggerContext) -> Arc<TrackingPublisher> {
        let store = Arc::new(TrackingEventStore::new(
            Arc::clone(&self.sequence),
            Arc::clone(&self.clock),
        ));
        debug!(
            request_id = %trigger.request_id(),
            request_type = trigger.request_type(),
            correlation_id = %store.correlation_id(),
            "opened event chain"
        );
        Arc::new(TrackingPublisher {
            base: Arc::clone(&self.base),
            store,
            causes: DashMap::new(),
        })
    }
}

impl EventPublisherFactory for TrackingPublisherFactory {
    fn create(&self, trigger: &TriggerContext) -> Arc<dyn EventPublisher> {
        self.create_tracking(trigger)
    }
}

/// Publisher bound to one causal chain.
pub struct TrackingPublisher {
    base: Arc<dyn EventPublisher>,
    store: Arc<TrackingEventStore>,
    causes: DashMap<EventKey, (MetadataId, SharedEvent)>,
}

impl TrackingPublisher {
    /// The store recording this chain.
    #[must_use]
    pub fn store(&self) -> &Arc<TrackingEventStore> {
        &self.store
    }
}

#[async_trait]
impl EventPublisher for TrackingPublisher {
    async fn publish(
        &self,
        event: SharedEvent,
        cancel: &CancellationToken,
    ) -> Result<Vec<SharedEvent>, PipelineError> {
        let tracking = self.store.add(event.as_ref());
        if let Some((_, (cause, _))) = self.causes.remove(&EventKey::of(&event)) {
            self.store.resolve_causation(tracking.id(), cause);
        }

        let outcomes = self.base.publish(Arc::clone(&event), cancel).await?;
        for outcome in &outcomes {
            self.causes
                .entry(EventKey::of(outcome))
                .or_insert_with(|| (tracking.id(), Arc::clone(outcome)));
        }
        debug!(
            event = event.event_name(),
            id = %tracking.id(),
            outcomes = outcomes.len(),
            "tracked event published"
        );
        Ok(outcomes)
    }
}
