//! Event publication, storage and automation contracts.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::event::{DomainEvent, EventMetadata, EventTrackingId, SharedEvent};
use crate::id::MetadataId;

/// What triggered a round of publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerContext {
    request_id: Uuid,
    request_type: &'static str,
}

impl TriggerContext {
    /// Context for a fresh trigger named `request_type`.
    #[must_use]
    pub fn new(request_type: &'static str) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            request_type,
        }
    }

    /// Context for a fresh request of type `Req`.
    #[must_use]
    pub fn for_request<Req>() -> Self {
        Self::new(std::any::type_name::<Req>())
    }

    /// Unique id of the triggering request.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Type name of the triggering request.
    #[must_use]
    pub fn request_type(&self) -> &'static str {
        self.request_type
    }
}

/// Delivers an event to its handlers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes `event` and returns the outcome events its handlers raised.
    ///
    /// # Errors
    ///
    /// Returns the first handler error.
    async fn publish(
        &self,
        event: SharedEvent,
        cancel: &CancellationToken,
    ) -> Result<Vec<SharedEvent>, PipelineError>;
}

/// Creates a publisher scoped to one trigger.
pub trait EventPublisherFactory: Send + Sync {
    /// Returns a publisher for `trigger`.
    fn create(&self, trigger: &TriggerContext) -> Arc<dyn EventPublisher>;
}

/// Append-only record of published events.
pub trait EventStore: Send + Sync {
    /// Records `event` and returns its freshly assigned tracking id.
    fn add(&self, event: &dyn DomainEvent) -> EventTrackingId;

    /// Rewrites the causation of the record `id`. Returns `false` if unknown.
    fn resolve_causation(&self, id: MetadataId, cause: MetadataId) -> bool;

    /// Every record, in insertion order.
    fn records(&self) -> Vec<EventMetadata>;
}

/// Reacts to published events by triggering further work.
#[async_trait]
pub trait ProcessManager: Send + Sync {
    /// Handles the next batch of events.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while reacting.
    async fn handle_next(
        &self,
        events: &[SharedEvent],
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError>;
}
