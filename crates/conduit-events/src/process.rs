//! Process manager driven by registered reactions.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::error::PipelineError;
use conduit_core::event::{DomainEvent, SharedEvent};
use conduit_core::handler::RequestHandler;
use conduit_core::publish::ProcessManager;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One step of automation: looks at an event and may trigger more work.
#[async_trait]
pub trait EventReactor: Send + Sync {
    /// Reacts to `event`.
    ///
    /// # Errors
    ///
    /// Returns an error if the triggered work fails.
    async fn react(&self, event: &SharedEvent, cancel: &CancellationToken)
    -> Result<(), PipelineError>;
}

/// Runs every reactor against every event, in order, stopping at the first error.
#[derive(Default)]
pub struct ReactiveProcessManager {
    reactors: Vec<Arc<dyn EventReactor>>,
}

impl ReactiveProcessManager {
    /// Creates a manager with no reactors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a reactor.
    #[must_use]
    pub fn with_reactor(mut self, reactor: Arc<dyn EventReactor>) -> Self {
        self.reactors.push(reactor);
        self
    }
}

#[async_trait]
impl ProcessManager for ReactiveProcessManager {
    async fn handle_next(
        &self,
        events: &[SharedEvent],
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        for event in events {
            for reactor in &self.reactors {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }
                reactor.react(event, cancel).await?;
            }
        }
        debug!(events = events.len(), reactors = self.reactors.len(), "automation round complete");
        Ok(())
    }
}

/// Reactor that turns events of type `E` into requests sent to a handler.
pub struct DispatchReaction<E, Req, H, F> {
    handler: H,
    to_request: F,
    _types: PhantomData<fn(&E) -> Req>,
}

impl<E, Req, H, F> DispatchReaction<E, Req, H, F>
where
    E: DomainEvent,
    Req: Send + Sync,
    H: RequestHandler<Req>,
    F: Fn(&E) -> Option<Req> + Send + Sync,
{
    /// Sends `to_request(event)` to `handler` whenever it returns a request.
    pub fn new(handler: H, to_request: F) -> Self {
        Self {
            handler,
            to_request,
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<E, Req, H, F> EventReactor for DispatchReaction<E, Req, H, F>
where
    E: DomainEvent,
    Req: Send + Sync,
    H: RequestHandler<Req>,
    F: Fn(&E) -> Option<Req> + Send + Sync,
{
    async fn react(
        &self,
        event: &SharedEvent,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let concrete: &dyn DomainEvent = event.as_ref();
        let Some(request) = concrete.as_any().downcast_ref::<E>().and_then(&self.to_request)
        else {
            return Ok(());
        };
        info!(
            event = concrete.event_name(),
            request = std::any::type_name::<Req>(),
            "automation dispatching request"
        );
        self.handler.handle(&request, cancel).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use conduit_test_support::{NamedEvent, ScriptedHandler};

    use super::*;

    #[derive(Debug)]
    struct Shipped {
        order: u32,
    }

    impl DomainEvent for Shipped {
        fn event_name(&self) -> &str {
            "order.shipped"
        }

        fn to_payload(&self) -> serde_json::Value {
            serde_json::json!({ "order": self.order })
        }
    }

    #[tokio::test]
    async fn test_reaction_dispatches_request_for_matching_event() {
        // Arrange
        let invoicer = Arc::new(ScriptedHandler::<u32, ()>::always(Ok(())));
        let manager = ReactiveProcessManager::new().with_reactor(Arc::new(
            DispatchReaction::new(Arc::clone(&invoicer), |e: &Shipped| Some(e.order)),
        ));
        let events: Vec<SharedEvent> = vec![
            Arc::new(Shipped { order: 7 }),
            Arc::new(NamedEvent::new("order.noted")),
        ];

        // Act
        let result = manager.handle_next(&events, &CancellationToken::new()).await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(invoicer.requests(), vec![7]);
    }

    #[tokio::test]
    async fn test_reaction_failure_stops_processing() {
        let invoicer = Arc::new(ScriptedHandler::<u32, ()>::always(Err(
            PipelineError::business("invoicing offline"),
        )));
        let manager = ReactiveProcessManager::new().with_reactor(Arc::new(
            DispatchReaction::new(Arc::clone(&invoicer), |e: &Shipped| Some(e.order)),
        ));
        let events: Vec<SharedEvent> =
            vec![Arc::new(Shipped { order: 1 }), Arc::new(Shipped { order: 2 })];

        let result = manager.handle_next(&events, &CancellationToken::new()).await;

        assert_eq!(result, Err(PipelineError::business("invoicing offline")));
        assert_eq!(invoicer.requests(), vec![1]);
    }
}
