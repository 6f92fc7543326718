//! Composition root: wires handlers into pipelines and registers them.

use std::sync::Arc;

use conduit_core::access::PrincipalAccessor;
use conduit_core::clock::SystemClock;
use conduit_core::id::AtomicSequence;
use conduit_events::dispatcher::EventDispatcher;
use conduit_events::tracking::TrackingPublisherFactory;
use conduit_events::unit_of_work::EventDrainingProvider;
use conduit_pipeline::builder::PipelineBuilder;
use conduit_pipeline::mediator::Mediator;
use conduit_pipeline::settings::PipelineSettings;

use crate::application::automation::{NotifyCustomerHandler, Outbox, order_automation};
use crate::application::command_handlers::{
    ANONYMOUS_LIMIT, PlaceOrderHandler, QuantityLimit, ReserveStock, order_rules,
};
use crate::application::query_handlers::FindOrderHandler;
use crate::domain::events::OrderPlaced;
use crate::store::{OrderStore, Sessions};

/// The caller on whose behalf requests are sent.
#[derive(Debug, Clone, Default)]
pub struct Operator(Option<String>);

impl Operator {
    /// An operator acting under `name`, or anonymously for `None`.
    #[must_use]
    pub fn new(name: Option<String>) -> Self {
        Self(name)
    }
}

impl PrincipalAccessor for Operator {
    fn display_name(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    pub mediator: Mediator,
    pub store: Arc<OrderStore>,
    pub outbox: Arc<Outbox>,
}

impl AppState {
    /// Builds every pipeline and registers it with the mediator.
    #[must_use]
    pub fn new(settings: &PipelineSettings, principal: Arc<dyn PrincipalAccessor>) -> Self {
        let store = Arc::new(OrderStore::new());
        let outbox = Arc::new(Outbox::new());

        let mut dispatcher = EventDispatcher::new();
        dispatcher.register::<OrderPlaced, _>(ReserveStock::new(Arc::clone(&store)));
        let publishers = TrackingPublisherFactory::new(
            Arc::new(dispatcher),
            Arc::new(AtomicSequence::default()),
            Arc::new(SystemClock),
        );
        let units = EventDrainingProvider::new(
            Arc::new(Sessions::new(Arc::clone(&store))),
            Arc::new(publishers),
        );

        let notify = PipelineBuilder::new(NotifyCustomerHandler::new(
            Arc::clone(&store),
            Arc::clone(&outbox),
        ))
        .build();

        let place = PipelineBuilder::new(PlaceOrderHandler::new(Arc::clone(&store)))
            .with_transaction(Arc::new(units))
            .with_settings(settings)
            .with_automation(Arc::new(order_automation(Arc::clone(&notify))))
            .with_validator(Arc::new(order_rules()))
            .with_authorization(
                Arc::new(QuantityLimit::new(Arc::clone(&principal), ANONYMOUS_LIMIT)),
                principal,
            )
            .build();

        let find = PipelineBuilder::lookup(FindOrderHandler::new(Arc::clone(&store)))
            .with_cache()
            .build();

        let bulk = PipelineBuilder::batch(Arc::clone(&place)).build();

        let mut mediator = Mediator::new();
        mediator
            .register(place)
            .register(find)
            .register(bulk)
            .register(notify);

        Self {
            mediator,
            store,
            outbox,
        }
    }
}
