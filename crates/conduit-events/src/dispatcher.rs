//! Type-keyed event dispatch table.
//!
//! Handlers are registered per concrete event type when the application
//! starts. Publishing looks the event's type up in the table and runs the
//! registered handlers in order.

use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::error::PipelineError;
use conduit_core::event::{DomainEvent, SharedEvent};
use conduit_core::publish::EventPublisher;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Handles one concrete event type.
#[async_trait]
pub trait EventHandler<E>: Send + Sync
where
    E: DomainEvent,
{
    /// Reacts to `event` and returns the events it raised in turn.
    ///
    /// # Errors
    ///
    /// Returns an error if the reaction fails; publishing stops there.
    async fn handle(
        &self,
        event: &E,
        cancel: &CancellationToken,
    ) -> Result<Vec<SharedEvent>, PipelineError>;
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn handle(
        &self,
        event: &dyn DomainEvent,
        cancel: &CancellationToken,
    ) -> Result<Vec<SharedEvent>, PipelineError>;
}

struct Typed<E, H> {
    handler: H,
    _event: PhantomData<fn(E)>,
}

#[async_trait]
impl<E, H> ErasedHandler for Typed<E, H>
where
    E: DomainEvent,
    H: EventHandler<E>,
{
    async fn handle(
        &self,
        event: &dyn DomainEvent,
        cancel: &CancellationToken,
    ) -> Result<Vec<SharedEvent>, PipelineError> {
        match event.as_any().downcast_ref::<E>() {
            Some(event) => self.handler.handle(event, cancel).await,
            None => Ok(Vec::new()),
        }
    }
}

/// Publisher that routes each event to the handlers registered for its type.
#[derive(Default)]
pub struct EventDispatcher {
    routes: HashMap<TypeId, Vec<Arc<dyn ErasedHandler>>>,
}

impl EventDispatcher {
    /// Creates an empty dispatch table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events of type `E`.
    pub fn register<E, H>(&mut self, handler: H) -> &mut Self
    where
        E: DomainEvent,
        H: EventHandler<E> + 'static,
    {
        let erased: Arc<dyn ErasedHandler> = Arc::new(Typed {
            handler,
            _event: PhantomData,
        });
        self.routes.entry(TypeId::of::<E>()).or_default().push(erased);
        self
    }

    /// Number of handlers registered for `E`.
    #[must_use]
    pub fn handler_count<E: DomainEvent>(&self) -> usize {
        self.routes.get(&TypeId::of::<E>()).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("event_types", &self.routes.len())
            .finish()
    }
}

#[async_trait]
impl EventPublisher for EventDispatcher {
    #[instrument(skip_all, fields(event = event.event_name()))]
    async fn publish(
        &self,
        event: SharedEvent,
        cancel: &CancellationToken,
    ) -> Result<Vec<SharedEvent>, PipelineError> {
        let concrete: &dyn DomainEvent = event.as_ref();
        let Some(handlers) = self.routes.get(&concrete.as_any().type_id()) else {
            debug!("no handlers registered");
            return Ok(Vec::new());
        };

        let mut outcomes = Vec::new();
        for handler in handlers {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            outcomes.extend(handler.handle(concrete, cancel).await?);
        }
        debug!(handlers = handlers.len(), outcomes = outcomes.len(), "event dispatched");
        Ok(outcomes)
    }
}
