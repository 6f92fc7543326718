//! Command handlers for placing orders.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::access::{Authorizer, PrincipalAccessor};
use conduit_core::aggregate::AggregateRoot;
use conduit_core::error::PipelineError;
use conduit_core::event::{EmitsEvents, SharedEvent};
use conduit_core::handler::RequestHandler;
use conduit_events::dispatcher::EventHandler;
use conduit_pipeline::validation::RuleValidator;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::domain::aggregates::Order;
use crate::domain::commands::PlaceOrder;
use crate::domain::events::OrderPlaced;
use crate::store::OrderStore;

/// Largest quantity a single order may ask for.
pub const MAX_QUANTITY: u32 = 100;

/// Largest quantity an anonymous caller may order.
pub const ANONYMOUS_LIMIT: u32 = 50;

/// Result of placing an order.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub order_id: Uuid,
    events: Vec<SharedEvent>,
}

impl EmitsEvents for Receipt {
    fn events(&self) -> Vec<SharedEvent> {
        self.events.clone()
    }
}

/// Creates the order and stages it in the store.
pub struct PlaceOrderHandler {
    store: Arc<OrderStore>,
}

impl PlaceOrderHandler {
    #[must_use]
    pub fn new(store: Arc<OrderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RequestHandler<PlaceOrder> for PlaceOrderHandler {
    type Response = Receipt;

    async fn handle(
        &self,
        request: &PlaceOrder,
        _cancel: &CancellationToken,
    ) -> Result<Receipt, PipelineError> {
        let order = Order::place(request.sku.clone(), request.quantity);
        let receipt = Receipt {
            order_id: order.aggregate_id(),
            events: order.events().pending(),
        };
        self.store.add(order);
        info!(order_id = %receipt.order_id, sku = %request.sku, "order placed");
        Ok(receipt)
    }
}

/// Reserves stock for every placed order while the placing unit of work
/// commits.
pub struct ReserveStock {
    store: Arc<OrderStore>,
}

impl ReserveStock {
    #[must_use]
    pub fn new(store: Arc<OrderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler<OrderPlaced> for ReserveStock {
    async fn handle(
        &self,
        event: &OrderPlaced,
        _cancel: &CancellationToken,
    ) -> Result<Vec<SharedEvent>, PipelineError> {
        let order = self.store.get(event.order_id).ok_or_else(|| PipelineError::NotFound {
            resource: "Order".to_owned(),
        })?;
        Ok(order.reserve_stock().into_iter().collect())
    }
}

/// Lets anonymous callers place only small orders.
pub struct QuantityLimit {
    principal: Arc<dyn PrincipalAccessor>,
    anonymous_limit: u32,
}

impl QuantityLimit {
    #[must_use]
    pub fn new(principal: Arc<dyn PrincipalAccessor>, anonymous_limit: u32) -> Self {
        Self {
            principal,
            anonymous_limit,
        }
    }
}

impl Authorizer<PlaceOrder> for QuantityLimit {
    fn authorize(&self, request: &PlaceOrder) -> bool {
        self.principal.display_name().is_some() || request.quantity <= self.anonymous_limit
    }
}

/// Structural rules every order must satisfy.
#[must_use]
pub fn order_rules() -> RuleValidator<PlaceOrder> {
    RuleValidator::new()
        .rule("sku", "must not be blank", |order: &PlaceOrder| {
            !order.sku.trim().is_empty()
        })
        .rule(
            "quantity",
            format!("must be between 1 and {MAX_QUANTITY}"),
            |order: &PlaceOrder| (1..=MAX_QUANTITY).contains(&order.quantity),
        )
}
